//! `hive status|stop|reload`: one control request to a running gateway.

use std::path::Path;

use {hive_client::GatewayClient, serde_json::Value};

use crate::Commands;

pub async fn handle_control(command: &Commands, socket: &Path) -> anyhow::Result<()> {
    let client = GatewayClient::new(socket);

    let data: Value = match command {
        Commands::Status => serde_json::to_value(client.status().await?)?,
        Commands::Stop => client.stop().await?,
        Commands::Reload => client.reload().await?,
        Commands::Gateway | Commands::Plugins { .. } => {
            anyhow::bail!("not a control command")
        },
    };

    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}
