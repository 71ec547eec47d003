//! Shared client-side cache: the `ConfigState` snapshot plus the
//! currently-selected database/table, read by both `DataClient` and
//! `SchemaClient` — one `ConfigState`, one `master`, shared across the
//! facade's halves.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use sdb_config::General;

use crate::configplane::ConfigState;
use crate::ids::{DatabaseId, TableId};

#[derive(Debug)]
pub struct Session {
    config: ArcSwap<ConfigState>,
    selected: Mutex<(Option<DatabaseId>, Option<TableId>)>,
    general: General,
}

impl Session {
    pub fn new(general: General) -> Self {
        Self {
            config: ArcSwap::from_pointee(ConfigState::default()),
            selected: Mutex::new((None, None)),
            general,
        }
    }

    pub fn general(&self) -> &General {
        &self.general
    }

    pub fn config(&self) -> Arc<ConfigState> {
        self.config.load_full()
    }

    pub fn set_config(&self, state: ConfigState) {
        self.config.store(Arc::new(state));
    }

    pub fn use_database(&self, database_id: DatabaseId) {
        let mut selected = self.selected.lock();
        selected.0 = Some(database_id);
        selected.1 = None;
    }

    pub fn use_table(&self, table_id: TableId) {
        self.selected.lock().1 = Some(table_id);
    }

    pub fn current_database(&self) -> Option<DatabaseId> {
        self.selected.lock().0
    }

    pub fn current_table(&self) -> Option<TableId> {
        self.selected.lock().1
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_use_database_clears_selected_table() {
        let session = Session::new(General::default());
        session.use_database(DatabaseId(1));
        session.use_table(TableId(1));
        assert_eq!(session.current_table(), Some(TableId(1)));

        session.use_database(DatabaseId(2));
        assert_eq!(session.current_database(), Some(DatabaseId(2)));
        assert_eq!(session.current_table(), None);
    }

    #[test]
    fn test_config_swap_visible_immediately() {
        let session = Session::new(General::default());
        let mut state = ConfigState::default();
        state.version = 7;
        session.set_config(state);
        assert_eq!(session.config().version, 7);
    }
}
