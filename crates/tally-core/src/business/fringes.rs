//! Fringe arithmetic.
//!
//! A FLAT fringe adds its rate. A PERCENT fringe adds `rate` times the base
//! value, capped at `cutoff` when one is set. Fringes without a unit or a
//! rate add nothing.

use super::Adjustment;
use crate::model::Unit;

fn contribution<A: Adjustment + ?Sized>(value: f64, adjustment: &A) -> f64 {
    match (adjustment.unit(), adjustment.rate()) {
        (Some(Unit::Flat), Some(rate)) => rate,
        (Some(Unit::Percent), Some(rate)) => {
            rate * adjustment.cutoff().map_or(value, |cutoff| value.min(cutoff))
        }
        _ => 0.0,
    }
}

/// Total contribution of `fringes` on top of `value`.
pub fn contribution_from_fringes<'a, A, I>(value: f64, fringes: I) -> f64
where
    A: Adjustment + 'a + ?Sized,
    I: IntoIterator<Item = &'a A>,
{
    fringes
        .into_iter()
        .fold(0.0, |acc, f| acc + contribution(value, f))
}

/// `value` plus its fringe contribution.
pub fn fringe_value<'a, A, I>(value: f64, fringes: I) -> f64
where
    A: Adjustment + 'a + ?Sized,
    I: IntoIterator<Item = &'a A>,
{
    value + contribution_from_fringes(value, fringes)
}

/// `value` minus the fringe contribution computed from `value` itself.
///
/// Only undoes [`fringe_value`] when given the original base value; applied
/// to an already-fringed value it subtracts a contribution computed on the
/// wrong base.
pub fn unfringe_value<'a, A, I>(value: f64, fringes: I) -> f64
where
    A: Adjustment + 'a + ?Sized,
    I: IntoIterator<Item = &'a A>,
{
    value - contribution_from_fringes(value, fringes)
}
