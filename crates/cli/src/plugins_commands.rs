//! CLI commands for plugin management.

use std::sync::Arc;

use {
    clap::Subcommand,
    hive_config::HiveConfig,
    hive_events::EventBus,
    hive_plugins::PluginLoader,
    hive_storage::{SqliteStore, Store},
};

#[derive(Subcommand)]
pub enum PluginAction {
    /// Install a plugin from a local path, `owner/repo`, `github:owner/repo[#ref]`,
    /// or a GitHub URL.
    Install {
        /// Plugin source.
        source: String,
    },
    /// Remove an installed plugin and its stored data.
    Uninstall {
        /// Plugin name.
        name: String,
    },
    /// List installed plugins.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_plugins(action: &PluginAction, config: &HiveConfig) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&config.storage.path).await?);
    let loader = PluginLoader::new(
        &config.plugins.registry,
        Arc::clone(&store),
        Arc::new(EventBus::new()),
    )
    .with_raw_base_url(&config.plugins.raw_base_url);

    let result = run(action, &loader).await;
    store.close().await?;
    result
}

async fn run(action: &PluginAction, loader: &PluginLoader) -> anyhow::Result<()> {
    match action {
        PluginAction::Install { source } => {
            let record = loader.install(source).await?;
            println!(
                "Installed plugin '{}' {} ({})",
                record.manifest.name, record.manifest.version, record.manifest.kind
            );
        },
        PluginAction::Uninstall { name } => {
            loader.uninstall(name).await?;
            println!("Uninstalled plugin '{name}'.");
        },
        PluginAction::List { json } => {
            let records = loader.installed()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No plugins installed.");
            } else {
                for record in &records {
                    println!(
                        "  {} {} [{}] from {}",
                        record.manifest.name,
                        record.manifest.version,
                        record.manifest.kind,
                        record.source
                    );
                }
            }
        },
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn install_list_uninstall_round() {
        let dir = tempfile::tempdir().unwrap();
        let plugin_dir = dir.path().join("echo");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(
            plugin_dir.join("plugin.json"),
            serde_json::json!({
                "name": "echo",
                "version": "1.0.0",
                "description": "Echoes messages",
                "author": "hive",
                "repository": "https://github.com/hive-org/echo",
                "kind": "tool",
                "permissions": {},
                "minCoreVersion": "0.1.0"
            })
            .to_string(),
        )
        .unwrap();

        let mut config = HiveConfig::default();
        config.storage.path = dir.path().join("hive.db");
        config.plugins.registry = dir.path().join("installed-plugins.json");

        let source = plugin_dir.to_string_lossy().into_owned();
        handle_plugins(&PluginAction::Install { source }, &config)
            .await
            .unwrap();
        handle_plugins(&PluginAction::List { json: true }, &config)
            .await
            .unwrap();

        let raw = std::fs::read_to_string(&config.plugins.registry).unwrap();
        assert!(raw.contains("\"echo\""));

        handle_plugins(
            &PluginAction::Uninstall {
                name: "echo".into(),
            },
            &config,
        )
        .await
        .unwrap();
        let err = handle_plugins(
            &PluginAction::Uninstall {
                name: "echo".into(),
            },
            &config,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("echo"));
    }
}
