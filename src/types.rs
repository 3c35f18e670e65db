/// Shared types used across the codebase

use serde::{Deserialize, Serialize};

/// Workspace operations exposed over HTTP.
/// Used by the request pipeline to decide which stages run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateWorkspace,
    KeepAlive,
    Find,
    Insert,
    Remove,
    Update,
    Aggregate,
    Count,
    DropCollection,
    ListCollections,
    DropAll,
}

impl Operation {
    /// Operations counted against the per-session rate limit
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Operation::Find
                | Operation::Insert
                | Operation::Remove
                | Operation::Update
                | Operation::DropCollection
                | Operation::Count
        )
    }

    /// Operations that address an existing workspace by `res_id`
    pub fn requires_resource(&self) -> bool {
        !matches!(self, Operation::CreateWorkspace)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateWorkspace => "create_workspace",
            Operation::KeepAlive => "keep_alive",
            Operation::Find => "find",
            Operation::Insert => "insert",
            Operation::Remove => "remove",
            Operation::Update => "update",
            Operation::Aggregate => "aggregate",
            Operation::Count => "count",
            Operation::DropCollection => "drop_collection",
            Operation::ListCollections => "list_collections",
            Operation::DropAll => "drop_all",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
