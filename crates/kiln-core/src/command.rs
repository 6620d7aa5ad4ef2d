//! Command-routing registry.
//!
//! Plugins register named actions here during activation; the host routes
//! application-level commands (key bindings, menus, …) to them by id.  The
//! registry is independent of the plugin graph: a command does not know which
//! plugin added it, and removing a plugin does not remove its commands.
//!
//! ```rust,ignore
//! commands.add_command("editor:save", handler_fn(|args| async move {
//!     save(args["path"].as_str())?;
//!     Ok(Value::Null)
//! }))?;
//!
//! commands.execute("editor:save", json!({ "path": "notes.md" })).await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{BoxError, CommandError, CommandResult, share_error};

/// An executable command.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    async fn execute(&self, args: Value) -> Result<Value, BoxError>;
}

/// Adapter turning an async closure into a [`CommandHandler`].
pub struct FnHandler<F>(F);

/// Wraps an async closure as a [`CommandHandler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> CommandHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
{
    async fn execute(&self, args: Value) -> Result<Value, BoxError> {
        (self.0)(args).await
    }
}

/// Registry of named commands.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
#[derive(Default)]
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `id`.
    ///
    /// Fails with [`CommandError::Duplicate`] if the id is taken.
    pub fn add_command(
        &self,
        id: impl Into<String>,
        handler: impl CommandHandler,
    ) -> CommandResult<()> {
        let id = id.into();
        let mut commands = self.commands.write();
        if commands.contains_key(&id) {
            return Err(CommandError::Duplicate(id));
        }
        debug!(command = %id, "Command registered");
        commands.insert(id, Arc::new(handler));
        Ok(())
    }

    /// Removes a command.  Returns `true` if it existed.
    pub fn remove_command(&self, id: &str) -> bool {
        self.commands.write().remove(id).is_some()
    }

    pub fn has_command(&self, id: &str) -> bool {
        self.commands.read().contains_key(id)
    }

    /// Registered command ids, sorted.
    pub fn list_commands(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.commands.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Runs the command registered under `id`.
    pub async fn execute(&self, id: &str, args: Value) -> CommandResult<Value> {
        let handler = self
            .commands
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| CommandError::NotFound(id.to_string()))?;

        handler.execute(args).await.map_err(|e| {
            warn!(command = %id, error = %e, "Command failed");
            CommandError::Failed {
                id: id.to_string(),
                cause: share_error(e),
            }
        })
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.list_commands())
            .finish()
    }
}
