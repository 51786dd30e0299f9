use crate::model::{ApplicationRecord, Entry, FavoriteEntry, Stats};
use log::{debug, warn};
use std::cmp::Ordering;

/// Stable reference to a table row.
///
/// Survives insertion and removal of other rows; a handle to an erased row
/// never resolves again, even after its slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryHandle {
    index: u32,
    generation: u32,
}

/// Receives every committed table mutation. Gets read-only access only.
pub trait PresentationSink {
    fn on_insert(&mut self, handle: EntryHandle, entry: &Entry);
    fn on_update(&mut self, old: EntryHandle, new: EntryHandle, entry: &Entry);
    fn on_erase(&mut self, handle: EntryHandle, entry: &Entry);
}

/// Sink that ignores everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl PresentationSink for NullSink {
    fn on_insert(&mut self, _: EntryHandle, _: &Entry) {}
    fn on_update(&mut self, _: EntryHandle, _: EntryHandle, _: &Entry) {}
    fn on_erase(&mut self, _: EntryHandle, _: &Entry) {}
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

pub struct EntryTable<S = NullSink> {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
    // desktop id and the position it sorts at
    pins: Vec<(String, i32)>,
    next_pin: i32,
    favs: Vec<FavoriteEntry>,
    sink: S,
}

impl<S: PresentationSink> EntryTable<S> {
    pub fn new(sink: S, pins: Vec<String>, favs: Vec<FavoriteEntry>) -> Self {
        let mut table = Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            pins: Vec::new(),
            next_pin: 0,
            favs,
            sink,
        };
        table.seed_pins(pins);
        table
    }

    /// Replaces the pinned/favorites lists and re-derives the stats of
    /// every row from them. Rows whose stats change get `on_update`.
    pub fn set_snapshots(&mut self, pins: Vec<String>, favs: Vec<FavoriteEntry>) {
        self.seed_pins(pins);
        self.favs = favs;

        let handles: Vec<EntryHandle> = self.iter().map(|(handle, _)| handle).collect();
        for handle in handles {
            let Some(entry) = self.get(handle) else { continue };
            let stats = self.seeded(&entry.desktop_id, Stats::default());
            if stats != entry.stats {
                self.set_stats(handle, stats);
            }
        }
    }

    pub fn emplace(&mut self, desktop_id: &str, stats: Stats, record: ApplicationRecord) -> EntryHandle {
        let stats = self.seeded(desktop_id, stats);
        let entry = Entry::new(desktop_id.to_string(), stats, record);

        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                EntryHandle { index, generation: slot.generation }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot { generation: 0, entry: Some(entry) });
                EntryHandle { index, generation: 0 }
            }
        };
        self.len += 1;

        if let Some(entry) = row(&self.slots, handle) {
            self.sink.on_insert(handle, entry);
        }
        handle
    }

    /// Replaces the row at `handle` wholesale. The returned handle is the one to keep.
    pub fn update(
        &mut self,
        handle: EntryHandle,
        desktop_id: &str,
        stats: Stats,
        record: ApplicationRecord,
    ) -> EntryHandle {
        let stats = self.seeded(desktop_id, stats);
        let entry = Entry::new(desktop_id.to_string(), stats, record);

        match self.get_mut(handle) {
            Some(slot) => *slot = entry,
            None => {
                warn!("update of stale handle for '{desktop_id}', inserting instead");
                return self.emplace(desktop_id, stats, entry.record);
            }
        }
        if let Some(entry) = row(&self.slots, handle) {
            self.sink.on_update(handle, handle, entry);
        }
        handle
    }

    pub fn erase(&mut self, handle: EntryHandle) -> Option<Entry> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;

        self.sink.on_erase(handle, &entry);
        Some(entry)
    }

    pub fn get(&self, handle: EntryHandle) -> Option<&Entry> {
        row(&self.slots, handle)
    }

    fn get_mut(&mut self, handle: EntryHandle) -> Option<&mut Entry> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    pub fn contains(&self, handle: EntryHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntryHandle, &Entry)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|entry| {
                (
                    EntryHandle { index: index as u32, generation: slot.generation },
                    entry,
                )
            })
        })
    }

    /// Pinned rows first, then favorites by clicks, then everything else by name.
    pub fn sorted(&self) -> Vec<(EntryHandle, &Entry)> {
        let mut rows: Vec<_> = self.iter().collect();
        rows.sort_by(|(_, a), (_, b)| display_order(a, b));
        rows
    }

    pub fn find(&self, desktop_id: &str) -> Option<EntryHandle> {
        self.iter()
            .find(|(_, entry)| entry.desktop_id == desktop_id)
            .map(|(handle, _)| handle)
    }

    /// Counts a launch of the row and keeps the favorites list in step.
    pub fn record_click(&mut self, handle: EntryHandle) -> Option<u32> {
        let entry = self.get_mut(handle)?;
        entry.stats.clicks += 1;
        entry.stats.favorite = true;
        let (id, clicks) = (entry.desktop_id.clone(), entry.stats.clicks);

        match self.favs.iter_mut().find(|fav| fav.desktop_id == id) {
            Some(fav) => fav.clicks = clicks,
            None => self.favs.push(FavoriteEntry::new(id, clicks)),
        }
        if let Some(entry) = row(&self.slots, handle) {
            self.sink.on_update(handle, handle, entry);
        }
        Some(clicks)
    }

    /// Pins or unpins the row. Returns the new pinned flag.
    ///
    /// A row pinned here sorts after every pin that already exists.
    pub fn toggle_pin(&mut self, handle: EntryHandle) -> Option<bool> {
        let entry = self.get(handle)?;
        let id = entry.desktop_id.clone();
        let mut stats = entry.stats;

        match self.pins.iter().position(|(pin, _)| *pin == id) {
            Some(index) => {
                self.pins.remove(index);
                stats.pinned = false;
                stats.position = 0;
            }
            None => {
                stats.pinned = true;
                stats.position = self.next_pin;
                self.next_pin += 1;
                self.pins.push((id, stats.position));
            }
        }
        self.set_stats(handle, stats);
        Some(stats.pinned)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn seed_pins(&mut self, pins: Vec<String>) {
        self.next_pin = pins.len() as i32;
        self.pins = pins
            .into_iter()
            .enumerate()
            .map(|(index, id)| (id, pin_position(index)))
            .collect();
    }

    /// `stats` with the pinned/favorite overrides for `desktop_id` applied.
    fn seeded(&self, desktop_id: &str, mut stats: Stats) -> Stats {
        if let Some((_, position)) = self.pins.iter().find(|(pin, _)| pin == desktop_id) {
            stats.pinned = true;
            stats.position = *position;
        }
        if let Some(fav) = self.favs.iter().find(|fav| fav.desktop_id == desktop_id) {
            stats.favorite = true;
            stats.clicks = fav.clicks;
        }
        stats
    }

    fn set_stats(&mut self, handle: EntryHandle, stats: Stats) {
        if let Some(entry) = self.get_mut(handle) {
            entry.stats = stats;
        }
        if let Some(entry) = row(&self.slots, handle) {
            debug!("stats of '{}' now {:?}", entry.desktop_id, entry.stats);
            self.sink.on_update(handle, handle, entry);
        }
    }
}

fn row(slots: &[Slot], handle: EntryHandle) -> Option<&Entry> {
    slots
        .get(handle.index as usize)
        .filter(|slot| slot.generation == handle.generation)
        .and_then(|slot| slot.entry.as_ref())
}

/// Later pins in the file sort first, mirroring its reversed order.
fn pin_position(index: usize) -> i32 {
    -(index as i32) - 1
}

fn display_order(a: &Entry, b: &Entry) -> Ordering {
    b.stats
        .pinned
        .cmp(&a.stats.pinned)
        .then_with(|| {
            if a.stats.pinned {
                a.stats.position.cmp(&b.stats.position)
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| b.stats.favorite.cmp(&a.stats.favorite))
        .then_with(|| b.stats.clicks.cmp(&a.stats.clicks))
        .then_with(|| a.record.name.to_lowercase().cmp(&b.record.name.to_lowercase()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Event {
        Insert(EntryHandle),
        Update(EntryHandle, EntryHandle),
        Erase(EntryHandle),
    }

    #[derive(Debug, Default)]
    pub struct Recorder {
        pub events: Vec<Event>,
    }

    impl PresentationSink for Recorder {
        fn on_insert(&mut self, handle: EntryHandle, _: &Entry) {
            self.events.push(Event::Insert(handle));
        }
        fn on_update(&mut self, old: EntryHandle, new: EntryHandle, _: &Entry) {
            self.events.push(Event::Update(old, new));
        }
        fn on_erase(&mut self, handle: EntryHandle, _: &Entry) {
            self.events.push(Event::Erase(handle));
        }
    }

    fn record(name: &str) -> ApplicationRecord {
        ApplicationRecord {
            name: name.to_string(),
            exec: name.to_lowercase(),
            ..Default::default()
        }
    }

    fn table() -> EntryTable<Recorder> {
        EntryTable::new(Recorder::default(), Vec::new(), Vec::new())
    }

    #[test]
    fn handles_survive_unrelated_mutations() {
        let mut table = table();
        let a = table.emplace("a.desktop", Stats::default(), record("A"));
        let b = table.emplace("b.desktop", Stats::default(), record("B"));
        for i in 0..100 {
            let id = format!("{i}.desktop");
            let h = table.emplace(&id, Stats::default(), record(&id));
            if i % 2 == 0 {
                table.erase(h);
            }
        }
        table.erase(b);
        assert_eq!(table.get(a).map(|e| e.record.name.as_str()), Some("A"));
        assert!(!table.contains(b));
        assert_eq!(table.len(), 51);
    }

    #[test]
    fn erased_handle_does_not_resolve_after_slot_reuse() {
        let mut table = table();
        let a = table.emplace("a.desktop", Stats::default(), record("A"));
        table.erase(a);
        let b = table.emplace("b.desktop", Stats::default(), record("B"));
        assert!(!table.contains(a));
        assert!(table.contains(b));
        assert!(table.erase(a).is_none());
    }

    #[test]
    fn update_with_same_content_notifies_once() {
        let mut table = table();
        let a = table.emplace("a.desktop", Stats::default(), record("A"));
        table.sink_mut().events.clear();

        let a2 = table.update(a, "a.desktop", Stats::default(), record("A"));
        assert_eq!(a, a2);
        assert_eq!(table.sink().events, vec![Event::Update(a, a)]);
    }

    #[test]
    fn update_replaces_record_wholesale() {
        let mut table = table();
        let mut first = record("A");
        first.icon = "old".into();
        let a = table.emplace("a.desktop", Stats::default(), first);
        let a = table.update(a, "a.desktop", Stats::default(), record("Renamed"));
        let entry = table.get(a).unwrap();
        assert_eq!(entry.record.name, "Renamed");
        assert_eq!(entry.record.icon, "");
    }

    #[test]
    fn snapshots_seed_stats() {
        let pins = vec!["first.desktop".to_string(), "second.desktop".to_string()];
        let favs = vec![FavoriteEntry::new("fav.desktop", 7)];
        let mut table = EntryTable::new(Recorder::default(), pins, favs);

        let first = table.emplace("first.desktop", Stats::default(), record("First"));
        let second = table.emplace("second.desktop", Stats::default(), record("Second"));
        let fav = table.emplace("fav.desktop", Stats::default(), record("Fav"));

        assert_eq!(table.get(first).unwrap().stats.position, -1);
        assert_eq!(table.get(second).unwrap().stats.position, -2);
        assert!(table.get(second).unwrap().stats.pinned);
        let stats = table.get(fav).unwrap().stats;
        assert!(stats.favorite);
        assert_eq!(stats.clicks, 7);
        assert!(!stats.pinned);

        let order: Vec<_> = table.sorted().into_iter().map(|(h, _)| h).collect();
        assert_eq!(order, vec![second, first, fav]);
    }

    #[test]
    fn clicks_survive_an_update() {
        let mut table = table();
        let a = table.emplace("a.desktop", Stats::default(), record("A"));
        table.record_click(a);
        assert_eq!(table.record_click(a), Some(2));
        let a = table.update(a, "a.desktop", Stats::default(), record("A"));
        assert_eq!(table.get(a).unwrap().stats.clicks, 2);
        assert!(table.get(a).unwrap().stats.favorite);
    }

    #[test]
    fn toggle_pin_round_trip() {
        let mut table = table();
        let a = table.emplace("a.desktop", Stats::default(), record("A"));
        assert_eq!(table.toggle_pin(a), Some(true));
        assert!(table.get(a).unwrap().stats.pinned);
        assert_eq!(table.toggle_pin(a), Some(false));
        let stats = table.get(a).unwrap().stats;
        assert!(!stats.pinned);
        assert_eq!(stats.position, 0);
    }

    #[test]
    fn new_pins_sort_after_existing_ones() {
        let mut table = EntryTable::new(Recorder::default(), vec!["a.desktop".to_string()], Vec::new());
        let a = table.emplace("a.desktop", Stats::default(), record("A"));
        let c = table.emplace("c.desktop", Stats::default(), record("C"));
        let b = table.emplace("b.desktop", Stats::default(), record("B"));
        table.sink_mut().events.clear();

        table.toggle_pin(c);
        table.toggle_pin(b);
        assert_eq!(table.get(c).unwrap().stats.position, 1);
        assert_eq!(table.get(b).unwrap().stats.position, 2);
        assert_eq!(table.sink().events, vec![Event::Update(c, c), Event::Update(b, b)]);

        let order: Vec<_> = table.sorted().into_iter().map(|(h, _)| h).collect();
        assert_eq!(order, vec![a, c, b]);

        // unpinning leaves the other positions alone
        table.toggle_pin(c);
        assert_eq!(table.get(b).unwrap().stats.position, 2);
        assert_eq!(table.get(a).unwrap().stats.position, -1);
    }

    #[test]
    fn set_snapshots_reseeds_live_rows() {
        let mut table = table();
        let a = table.emplace("a.desktop", Stats::default(), record("A"));
        let b = table.emplace("b.desktop", Stats::default(), record("B"));
        let c = table.emplace("c.desktop", Stats::default(), record("C"));
        table.sink_mut().events.clear();

        table.set_snapshots(vec!["b.desktop".to_string()], vec![FavoriteEntry::new("a.desktop", 3)]);

        let stats = table.get(a).unwrap().stats;
        assert!(stats.favorite);
        assert_eq!(stats.clicks, 3);
        assert_eq!(table.get(b).unwrap().stats.position, -1);
        assert_eq!(table.get(c).unwrap().stats, Stats::default());
        assert_eq!(table.sink().events, vec![Event::Update(a, a), Event::Update(b, b)]);

        // dropped from the lists on disk, dropped from the rows
        table.set_snapshots(Vec::new(), Vec::new());
        assert!(!table.get(b).unwrap().stats.pinned);
        assert_eq!(table.get(a).unwrap().stats.clicks, 0);
    }

    #[test]
    fn find_looks_up_by_desktop_id() {
        let mut table = table();
        let a = table.emplace("kde/a.desktop", Stats::default(), record("A"));
        assert_eq!(table.find("kde/a.desktop"), Some(a));
        assert_eq!(table.find("a.desktop"), None);
        table.erase(a);
        assert_eq!(table.find("kde/a.desktop"), None);
    }

    #[test]
    fn sorted_puts_plain_entries_by_name() {
        let mut table = table();
        table.emplace("z.desktop", Stats::default(), record("zeta"));
        table.emplace("a.desktop", Stats::default(), record("Alpha"));
        let names: Vec<_> = table.sorted().into_iter().map(|(_, e)| e.record.name.clone()).collect();
        assert_eq!(names, vec!["Alpha", "zeta"]);
    }
}
