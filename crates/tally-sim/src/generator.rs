//! Seeded generator of user edits and delayed server confirmations.
//!
//! User events reference rows picked from the current collection; a
//! configurable share of references point at ids that never existed.
//! Creates and edits schedule the server's answer a few steps later, so a
//! confirmation can arrive after the user already deleted the row.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;

use tally_core::event::{
    DataChangePayload, GroupDeletePayload, GroupMembershipPayload, GroupPatch, GroupUpdatePayload,
    MarkupDeletePayload, MarkupMembershipPayload, MarkupPatch, MarkupUpdatePayload,
    ModelsAddedPayload, ModelsUpdatedPayload, NewPlaceholder, PlaceholdersActivatedPayload,
    RowAddPayload, RowChange, RowInsertPayload, RowUpdate, TableEvent, UpdateRowsPayload,
};
use tally_core::model::{Group, Markup, ServerModel, TableResponse, Unit};
use tally_core::rows::{
    CollectionError, GroupId, MarkupId, ModelId, PlaceholderId, Row, RowCollection, RowData, RowId,
};

/// Ids at or above this were never handed out.
const STALE_ID_BASE: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Share of user references that point at ids never created (percent).
    pub stale_percent: u8,
    /// Upper bound on how many steps a server confirmation is delayed.
    pub max_confirm_delay: u64,
    /// Share of deletes aimed at rows whose create is still unconfirmed
    /// (percent).
    pub delete_race_percent: u8,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            stale_percent: 10,
            max_confirm_delay: 4,
            delete_race_percent: 30,
        }
    }
}

/// Who produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    User,
    Server,
}

struct Scheduled {
    due: u64,
    event: TableEvent,
}

pub struct EventGenerator {
    rng: StdRng,
    config: GeneratorConfig,
    next_model: ModelId,
    next_group: u64,
    next_markup: u64,
    next_stale: u64,
    scheduled: Vec<Scheduled>,
    /// Placeholders whose activation is scheduled.
    unconfirmed: Vec<PlaceholderId>,
}

impl EventGenerator {
    #[must_use]
    pub fn new(seed: u64, config: GeneratorConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
            next_model: 1,
            next_group: 1,
            next_markup: 1,
            next_stale: STALE_ID_BASE,
            scheduled: Vec::new(),
            unconfirmed: Vec::new(),
        }
    }

    /// The table the simulation starts from: `count` models, the first few
    /// of them grouped.
    ///
    /// # Errors
    ///
    /// Returns an error if the generated table repeats an id.
    pub fn initial_rows(&mut self, count: usize) -> Result<RowCollection, CollectionError> {
        let models: Vec<ServerModel> = (0..count).map(|_| self.new_model()).collect();
        let groups = if models.len() >= 3 {
            vec![Group {
                id: self.fresh_group(),
                name: "Above the line".into(),
                color: None,
                children: models.iter().take(2).map(|m| m.id).collect(),
            }]
        } else {
            Vec::new()
        };
        RowCollection::from_response(&TableResponse {
            models,
            groups,
            markups: Vec::new(),
        })
    }

    /// Confirmations still waiting to be delivered.
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.scheduled.len()
    }

    /// Pop the earliest scheduled confirmation regardless of its due step.
    pub fn drain_next(&mut self) -> Option<TableEvent> {
        let idx = self
            .scheduled
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.due)
            .map(|(idx, _)| idx)?;
        Some(self.take_scheduled(idx))
    }

    /// The event for `step`: a due confirmation if there is one, otherwise
    /// a user edit against `rows`.
    pub fn next_event(&mut self, step: u64, rows: &RowCollection) -> (Origin, TableEvent) {
        if let Some(idx) = self.scheduled.iter().position(|s| s.due <= step) {
            return (Origin::Server, self.take_scheduled(idx));
        }
        (Origin::User, self.user_event(step, rows))
    }

    fn take_scheduled(&mut self, idx: usize) -> TableEvent {
        let event = self.scheduled.remove(idx).event;
        if let TableEvent::PlaceholdersActivated(payload) = &event {
            self.unconfirmed
                .retain(|p| !payload.placeholder_ids.contains(p));
        }
        event
    }

    fn user_event(&mut self, step: u64, rows: &RowCollection) -> TableEvent {
        let roll = self.rng.gen_range(0..100);
        let event = match roll {
            0..15 => Some(self.row_add(step, rows)),
            15..22 => self.row_insert(step, rows),
            22..45 => self.data_change(step, rows),
            45..55 => self.row_delete(rows),
            55..62 => self.group_add(rows),
            62..66 => self.group_update(rows),
            66..69 => self.group_delete(rows),
            69..75 => self.group_membership(rows),
            75..80 => self.markup_add(rows),
            80..84 => self.markup_update(rows),
            84..88 => self.markup_removal(rows),
            88..94 => self.update_rows(rows),
            _ => self.models_added(rows),
        };
        // Nothing to act on yet.
        event.unwrap_or_else(|| self.row_add(step, rows))
    }

    // -- id helpers --------------------------------------------------------

    fn new_model(&mut self) -> ServerModel {
        let id = self.next_model;
        self.next_model += 1;
        let mut fields = RowData::new();
        fields.insert("quantity".into(), json!(self.rng.gen_range(1..5)));
        fields.insert("rate".into(), json!(self.rng.gen_range(10..500)));
        ServerModel {
            id,
            children: Vec::new(),
            fields,
        }
    }

    fn fresh_group(&mut self) -> u64 {
        let id = self.next_group;
        self.next_group += 1;
        id
    }

    fn fresh_markup(&mut self) -> u64 {
        let id = self.next_markup;
        self.next_markup += 1;
        id
    }

    fn fresh_placeholder(&mut self) -> NewPlaceholder {
        NewPlaceholder::blank(&mut self.rng)
    }

    fn stale(&mut self) -> bool {
        self.rng.gen_range(0..100) < u32::from(self.config.stale_percent)
    }

    fn stale_id(&mut self) -> u64 {
        self.next_stale += 1;
        self.next_stale
    }

    fn delay(&mut self, step: u64) -> u64 {
        step + self.rng.gen_range(1..=self.config.max_confirm_delay.max(1))
    }

    fn pick<T: Clone>(&mut self, items: &[T]) -> Option<T> {
        items.choose(&mut self.rng).cloned()
    }

    fn pick_some<T: Clone>(&mut self, items: &[T], max: usize) -> Vec<T> {
        let count = self.rng.gen_range(1..=max.max(1)).min(items.len());
        items
            .choose_multiple(&mut self.rng, count)
            .cloned()
            .collect()
    }

    fn data_row_ids(rows: &RowCollection) -> Vec<RowId> {
        rows.iter()
            .filter(|r| r.data().is_some())
            .map(Row::id)
            .collect()
    }

    fn model_ids(rows: &RowCollection) -> Vec<ModelId> {
        rows.iter().filter_map(|r| r.id().as_model()).collect()
    }

    fn group_ids(rows: &RowCollection) -> Vec<GroupId> {
        rows.iter()
            .filter_map(|r| match r {
                Row::Group(g) => Some(g.id),
                _ => None,
            })
            .collect()
    }

    fn markup_ids(rows: &RowCollection) -> Vec<MarkupId> {
        rows.iter()
            .filter_map(|r| match r {
                Row::Markup(m) => Some(m.id),
                _ => None,
            })
            .collect()
    }

    /// A data row to act on, or a never-created model id.
    fn target_row(&mut self, rows: &RowCollection) -> Option<RowId> {
        if self.stale() {
            return Some(RowId::Model(self.stale_id()));
        }
        self.pick(&Self::data_row_ids(rows))
    }

    fn target_group(&mut self, rows: &RowCollection) -> Option<GroupId> {
        if self.stale() {
            return Some(GroupId(self.stale_id()));
        }
        self.pick(&Self::group_ids(rows))
    }

    fn target_markup(&mut self, rows: &RowCollection) -> Option<MarkupId> {
        if self.stale() {
            return Some(MarkupId(self.stale_id()));
        }
        self.pick(&Self::markup_ids(rows))
    }

    fn member_models(&mut self, rows: &RowCollection) -> Vec<ModelId> {
        let mut children = self.pick_some(&Self::model_ids(rows), 4);
        if self.stale() {
            children.push(self.stale_id());
        }
        children
    }

    fn schedule_activation(&mut self, step: u64, placeholder: &NewPlaceholder) {
        let due = self.delay(step);
        let mut model = self.new_model();
        model.fields.extend(placeholder.data.clone());
        self.unconfirmed.push(placeholder.id.clone());
        self.scheduled.push(Scheduled {
            due,
            event: TableEvent::PlaceholdersActivated(PlaceholdersActivatedPayload {
                placeholder_ids: vec![placeholder.id.clone()],
                models: vec![model],
            }),
        });
    }

    // -- user events -------------------------------------------------------

    fn row_add(&mut self, step: u64, rows: &RowCollection) -> TableEvent {
        let count = self.rng.gen_range(1..=3);
        let placeholders: Vec<NewPlaceholder> =
            (0..count).map(|_| self.fresh_placeholder()).collect();
        for placeholder in &placeholders {
            self.schedule_activation(step, placeholder);
        }
        let group = if self.rng.gen_bool(0.3) {
            self.target_group(rows)
        } else {
            None
        };
        TableEvent::RowAdd(RowAddPayload {
            placeholders,
            group,
        })
    }

    fn row_insert(&mut self, step: u64, rows: &RowCollection) -> Option<TableEvent> {
        let previous = self.target_row(rows)?;
        let mut placeholder = self.fresh_placeholder();
        placeholder
            .data
            .insert("description".into(), json!(format!("Inserted at {step}")));
        self.schedule_activation(step, &placeholder);
        Some(TableEvent::RowInsert(RowInsertPayload {
            previous,
            placeholder,
        }))
    }

    fn data_change(&mut self, step: u64, rows: &RowCollection) -> Option<TableEvent> {
        let edits = self.rng.gen_range(1..=4);
        let mut changes = Vec::with_capacity(edits);
        for _ in 0..edits {
            let id = self.target_row(rows)?;
            let field = if self.rng.gen_bool(0.5) { "rate" } else { "quantity" };
            let value = self.rng.gen_range(1..1_000);
            let old = rows
                .get(&id)
                .and_then(Row::data)
                .and_then(|data| data.get(field).cloned())
                .unwrap_or_default();
            changes.push(RowChange::new(id).with(field, old, value));
        }

        // The server echoes some model edits back later.
        for change in &changes {
            let RowId::Model(id) = change.id else {
                continue;
            };
            let Some(mut fields) = rows.get(&change.id).and_then(Row::data).cloned() else {
                continue;
            };
            if !self.rng.gen_bool(0.5) {
                continue;
            }
            for (field, cell) in &change.data {
                fields.insert(field.clone(), cell.new_value.clone());
            }
            let due = self.delay(step);
            self.scheduled.push(Scheduled {
                due,
                event: TableEvent::ModelsUpdated(ModelsUpdatedPayload {
                    models: vec![ServerModel {
                        id,
                        children: Vec::new(),
                        fields,
                    }],
                }),
            });
        }
        Some(TableEvent::DataChange(DataChangePayload { changes }))
    }

    fn row_delete(&mut self, rows: &RowCollection) -> Option<TableEvent> {
        let racing: Vec<RowId> = self
            .unconfirmed
            .iter()
            .map(|p| RowId::Placeholder(p.clone()))
            .filter(|id| rows.contains(id))
            .collect();
        let race = !racing.is_empty()
            && self.rng.gen_range(0..100) < u32::from(self.config.delete_race_percent);
        let id = if race {
            self.pick(&racing)?
        } else if self.rng.gen_bool(0.15) {
            let aggregates: Vec<RowId> = rows
                .iter()
                .filter(|r| r.data().is_none())
                .map(Row::id)
                .collect();
            self.pick(&aggregates)
                .or_else(|| self.target_row(rows))?
        } else {
            self.target_row(rows)?
        };
        Some(TableEvent::row_delete(vec![id]))
    }

    fn group_add(&mut self, rows: &RowCollection) -> Option<TableEvent> {
        let id = self.fresh_group();
        Some(TableEvent::GroupAdd(Group {
            id,
            name: format!("Group {id}"),
            color: self.rng.gen_bool(0.5).then(|| "#7e57c2".to_string()),
            children: self.member_models(rows),
        }))
    }

    fn group_update(&mut self, rows: &RowCollection) -> Option<TableEvent> {
        let id = self.target_group(rows)?;
        let mut data = GroupPatch::default();
        if self.rng.gen_bool(0.5) {
            data.name = Some(format!("Renamed {}", id.0));
        } else {
            data.children = Some(self.member_models(rows));
        }
        Some(TableEvent::GroupUpdate(GroupUpdatePayload { id, data }))
    }

    fn group_delete(&mut self, rows: &RowCollection) -> Option<TableEvent> {
        let id = self.target_group(rows)?;
        Some(TableEvent::GroupDelete(GroupDeletePayload { id }))
    }

    fn group_membership(&mut self, rows: &RowCollection) -> Option<TableEvent> {
        let group = self.target_group(rows)?;
        let mut members = self.pick_some(&Self::data_row_ids(rows), 3);
        if self.stale() {
            members.push(RowId::Model(self.stale_id()));
        }
        let payload = GroupMembershipPayload {
            group,
            rows: members,
        };
        if self.rng.gen_bool(0.6) {
            Some(TableEvent::RowAddToGroup(payload))
        } else {
            Some(TableEvent::RowRemoveFromGroup(payload))
        }
    }

    fn markup_add(&mut self, rows: &RowCollection) -> Option<TableEvent> {
        let id = self.fresh_markup();
        let percent = self.rng.gen_bool(0.7);
        Some(TableEvent::MarkupAdd(Markup {
            id,
            identifier: Some(format!("MU{id}")),
            description: None,
            unit: Some(if percent { Unit::Percent } else { Unit::Flat }),
            rate: Some(if percent {
                f64::from(self.rng.gen_range(1..30_u8)) / 100.0
            } else {
                f64::from(self.rng.gen_range(10..500_u16))
            }),
            children: self.member_models(rows),
        }))
    }

    fn markup_update(&mut self, rows: &RowCollection) -> Option<TableEvent> {
        let id = self.target_markup(rows)?;
        let mut data = MarkupPatch::default();
        if self.rng.gen_bool(0.5) {
            data.rate = Some(f64::from(self.rng.gen_range(1..30_u8)) / 100.0);
            data.unit = Some(Unit::Percent);
        } else {
            data.children = Some(self.member_models(rows));
        }
        Some(TableEvent::MarkupUpdate(MarkupUpdatePayload { id, data }))
    }

    fn markup_removal(&mut self, rows: &RowCollection) -> Option<TableEvent> {
        let markup = self.target_markup(rows)?;
        if self.rng.gen_bool(0.5) {
            return Some(TableEvent::MarkupDelete(MarkupDeletePayload { id: markup }));
        }
        let members: Vec<RowId> = rows.markup_members(markup).map(Row::id).collect();
        let mut targets = self.pick_some(&members, 2);
        if targets.is_empty() {
            targets.push(self.target_row(rows)?);
        }
        Some(TableEvent::RowRemoveFromMarkup(MarkupMembershipPayload {
            markup,
            rows: targets,
        }))
    }

    fn update_rows(&mut self, rows: &RowCollection) -> Option<TableEvent> {
        let mut targets = self.pick_some(&Self::model_ids(rows), 2)
            .into_iter()
            .map(RowId::Model)
            .collect::<Vec<_>>();
        if targets.is_empty() || self.stale() {
            targets.push(RowId::Model(self.stale_id()));
        }
        let updates = targets
            .into_iter()
            .map(|id| RowUpdate {
                id,
                data: std::iter::once(("actual".to_string(), json!(self.rng.gen_range(0..800))))
                    .collect(),
            })
            .collect();
        Some(TableEvent::UpdateRows(UpdateRowsPayload { rows: updates }))
    }

    fn models_added(&mut self, rows: &RowCollection) -> Option<TableEvent> {
        let count = self.rng.gen_range(1..=2);
        let models = (0..count).map(|_| self.new_model()).collect();
        let group = if self.rng.gen_bool(0.4) {
            self.target_group(rows)
        } else {
            None
        };
        Some(TableEvent::ModelsAdded(ModelsAddedPayload { models, group }))
    }
}
