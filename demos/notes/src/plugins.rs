//! The demo's plugins.
//!
//! ```text
//! store ◀── notes        (required)
//!   ▲
//!   └────── stats        (optional, deferred)
//! telemetry              (auto-start, cannot be deactivated)
//! ```

use kiln::prelude::*;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::info;

/// Note storage shared by every plugin that needs it.
pub trait NoteStore: Send + Sync {
    fn add(&self, title: &str, body: &str) -> usize;
    fn list(&self) -> Vec<Value>;
    fn len(&self) -> usize;
}

#[derive(Default)]
struct MemoryStore {
    notes: Mutex<Vec<(String, String)>>,
}

impl NoteStore for MemoryStore {
    fn add(&self, title: &str, body: &str) -> usize {
        let mut notes = self.notes.lock();
        notes.push((title.to_string(), body.to_string()));
        notes.len() - 1
    }

    fn list(&self) -> Vec<Value> {
        self.notes
            .lock()
            .iter()
            .enumerate()
            .map(|(id, (title, body))| json!({ "id": id, "title": title, "body": body }))
            .collect()
    }

    fn len(&self) -> usize {
        self.notes.lock().len()
    }
}

pub static STORE: LazyLock<Token<dyn NoteStore>> =
    LazyLock::new(|| Token::new("notes.store").with_description("In-memory note storage"));

pub fn all() -> Vec<PluginDescriptor> {
    vec![store(), notes(), stats(), telemetry()]
}

fn store() -> PluginDescriptor {
    PluginDescriptor::builder("store")
        .description("Keeps notes in memory")
        .provides(&STORE, |_, _| async {
            Ok::<_, BoxError>(Arc::new(MemoryStore::default()) as Arc<dyn NoteStore>)
        })
        .deactivate(|_, _| async { Ok::<_, BoxError>(()) })
        .build()
}

fn notes() -> PluginDescriptor {
    PluginDescriptor::builder("notes")
        .description("notes:add and notes:list commands")
        .auto_start(true)
        .requires(&STORE)
        .activate(|ctx, services| async move {
            let store = services.require(&STORE)?;

            let writer = Arc::clone(&store);
            ctx.commands().add_command(
                "notes:add",
                handler_fn(move |args| {
                    let store = Arc::clone(&writer);
                    async move {
                        let title = args["title"].as_str().ok_or("missing 'title'")?;
                        let body = args["body"].as_str().unwrap_or_default();
                        Ok::<_, BoxError>(json!(store.add(title, body)))
                    }
                }),
            )?;
            ctx.commands().add_command(
                "notes:list",
                handler_fn(move |_| {
                    let store = Arc::clone(&store);
                    async move { Ok::<_, BoxError>(Value::Array(store.list())) }
                }),
            )?;
            Ok::<_, BoxError>(())
        })
        .deactivate(|ctx, _| async move {
            ctx.commands().remove_command("notes:add");
            ctx.commands().remove_command("notes:list");
            Ok::<_, BoxError>(())
        })
        .build()
}

fn stats() -> PluginDescriptor {
    PluginDescriptor::builder("stats")
        .description("stats:summary command")
        .auto_start(AutoStart::Deferred)
        .optional(&STORE)
        .activate(|ctx, services| async move {
            let store = services.get(&STORE);
            ctx.commands().add_command(
                "stats:summary",
                handler_fn(move |_| {
                    let count = store.as_ref().map(|s| s.len());
                    async move { Ok::<_, BoxError>(json!({ "notes": count })) }
                }),
            )?;
            Ok::<_, BoxError>(())
        })
        .deactivate(|ctx, _| async move {
            ctx.commands().remove_command("stats:summary");
            Ok::<_, BoxError>(())
        })
        .build()
}

fn telemetry() -> PluginDescriptor {
    PluginDescriptor::builder("telemetry")
        .description("Logs that the shell is alive")
        .auto_start(true)
        .activate(|ctx, _| async move {
            info!(plugins = ?ctx.list_plugins(), "Telemetry online");
            Ok::<_, BoxError>(())
        })
        .build()
}
