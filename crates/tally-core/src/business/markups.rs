//! Markup arithmetic.

use super::Adjustment;
use crate::model::Unit;

/// Contribution of one markup on top of `value`; zero when incomplete.
pub fn markup_contribution<A: Adjustment + ?Sized>(value: f64, markup: &A) -> f64 {
    match (markup.unit(), markup.rate()) {
        (Some(Unit::Percent), Some(rate)) => rate * value,
        (Some(Unit::Flat), Some(rate)) => rate,
        _ => 0.0,
    }
}

/// Total contribution of `markups` on top of `value`.
pub fn contribution_from_markups<'a, A, I>(value: f64, markups: I) -> f64
where
    A: Adjustment + 'a + ?Sized,
    I: IntoIterator<Item = &'a A>,
{
    markups
        .into_iter()
        .fold(0.0, |acc, m| acc + markup_contribution(value, m))
}
