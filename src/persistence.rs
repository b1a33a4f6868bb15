//! Persisted state: the append-only action log, config history, and the
//! `manual_sync_orders.json` sidecar. None of this is authoritative for
//! liveness — the venue is. Flat-file JSON persistence mirrors a plain
//! `load_state`/`save_state` pattern; the action log's field set mirrors
//! `config_models.py::ActionLog`.

use std::fs;
use std::path::Path;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::venue::OrderSide;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub id: Option<u64>,
    pub ts: i64,
    pub user: String,
    pub action: String,
    pub params_json: String,
    pub result: String,
    pub mode: String,
    pub venue: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigHistoryEntry {
    pub ts: i64,
    pub config_json: String,
}

/// `OrderSide` lives in `venue` (the adapter-facing module) and doesn't
/// implement Serialize/Deserialize; this is the on-disk representation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SerdeSide {
    Buy,
    Sell,
}

impl From<OrderSide> for SerdeSide {
    fn from(s: OrderSide) -> Self {
        match s {
            OrderSide::Buy => SerdeSide::Buy,
            OrderSide::Sell => SerdeSide::Sell,
        }
    }
}

impl From<SerdeSide> for OrderSide {
    fn from(s: SerdeSide) -> Self {
        match s {
            SerdeSide::Buy => OrderSide::Buy,
            SerdeSide::Sell => OrderSide::Sell,
        }
    }
}

/// One externally supplied order from `POST sync/manual` or the
/// `manual_sync_orders.json` sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualSyncOrder {
    pub id: String,
    pub level_index: usize,
    pub zone_id: u32,
    pub side: SerdeSide,
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ManualSyncFile {
    pub orders: Vec<ManualSyncOrder>,
}

/// Append-only action log and config history. An in-process `Vec`-backed
/// implementation behind a trait seam so a real database can later sit
/// behind the same interface without the engine or orchestrator caring —
/// the audit-log database schema is a separate concern, so no concrete
/// schema is hard-wired here.
pub trait Persistence: Send + Sync {
    fn record_action(&mut self, entry: ActionLogEntry);
    fn record_config(&mut self, entry: ConfigHistoryEntry);
    fn action_log(&self) -> &[ActionLogEntry];
    fn config_history(&self) -> &[ConfigHistoryEntry];
}

#[derive(Default)]
pub struct InMemoryPersistence {
    actions: Vec<ActionLogEntry>,
    configs: Vec<ConfigHistoryEntry>,
    next_id: u64,
}

impl Persistence for InMemoryPersistence {
    fn record_action(&mut self, mut entry: ActionLogEntry) {
        entry.id = Some(self.next_id);
        self.next_id += 1;
        info!("action logged: {} -> {}", entry.action, entry.result);
        self.actions.push(entry);
    }

    fn record_config(&mut self, entry: ConfigHistoryEntry) {
        self.configs.push(entry);
    }

    fn action_log(&self) -> &[ActionLogEntry] {
        &self.actions
    }

    fn config_history(&self) -> &[ConfigHistoryEntry] {
        &self.configs
    }
}

pub fn load_manual_sync<P: AsRef<Path>>(path: P) -> Option<ManualSyncFile> {
    if !path.as_ref().exists() {
        return None;
    }
    match fs::read_to_string(&path) {
        Ok(content) => match serde_json::from_str::<ManualSyncFile>(&content) {
            Ok(file) => {
                info!(
                    "loaded manual sync sidecar {:?}: {} orders",
                    path.as_ref(),
                    file.orders.len()
                );
                Some(file)
            }
            Err(e) => {
                error!("failed to parse manual sync sidecar: {}", e);
                None
            }
        },
        Err(e) => {
            warn!("failed to read manual sync sidecar: {}", e);
            None
        }
    }
}

pub fn save_manual_sync<P: AsRef<Path>>(path: P, file: &ManualSyncFile) {
    match serde_json::to_string_pretty(file) {
        Ok(content) => {
            if let Err(e) = fs::write(path, content) {
                error!("failed to write manual sync sidecar: {}", e);
            }
        }
        Err(e) => error!("failed to serialize manual sync sidecar: {}", e),
    }
}

pub fn clear_manual_sync<P: AsRef<Path>>(path: P) {
    if path.as_ref().exists() {
        if let Err(e) = fs::remove_file(&path) {
            error!("failed to remove manual sync sidecar: {}", e);
        } else {
            info!("removed manual sync sidecar {:?}", path.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_persistence_assigns_ids() {
        let mut p = InMemoryPersistence::default();
        p.record_action(ActionLogEntry {
            id: None,
            ts: 1_767_225_600_000,
            user: "local".into(),
            action: "start".into(),
            params_json: "{}".into(),
            result: "ok".into(),
            mode: "sim".into(),
            venue: "B".into(),
        });
        p.record_action(ActionLogEntry {
            id: None,
            ts: 1_767_225_605_000,
            user: "local".into(),
            action: "stop".into(),
            params_json: "{}".into(),
            result: "ok".into(),
            mode: "sim".into(),
            venue: "B".into(),
        });
        assert_eq!(p.action_log()[0].id, Some(0));
        assert_eq!(p.action_log()[1].id, Some(1));
    }

    #[test]
    fn manual_sync_round_trips_through_disk() {
        let path = std::env::temp_dir().join("grid_recon_manual_sync_test.json");
        let file = ManualSyncFile {
            orders: vec![ManualSyncOrder {
                id: "abc".into(),
                level_index: 1,
                zone_id: 0,
                side: SerdeSide::Buy,
                price: 125.0,
                size: 0.01,
            }],
        };
        save_manual_sync(&path, &file);
        let loaded = load_manual_sync(&path).unwrap();
        assert_eq!(loaded.orders.len(), 1);
        assert_eq!(loaded.orders[0].id, "abc");
        clear_manual_sync(&path);
        assert!(load_manual_sync(&path).is_none());
    }
}
