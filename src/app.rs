use anyhow::{Context as AnyhowContext, Result};
use poise::Framework;
use serenity::all::{ClientBuilder, GatewayIntents};
use tracing_subscriber::EnvFilter;

use crate::auth::OwnerList;
use crate::commands::{autorole, say, settings, standing};
use crate::config::Config;
use crate::events::event_handler;
use crate::state::AppState;

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    let Config { discord_token, database_url, owners, dev_guild } = config;
    let owners = OwnerList::new(owners);

    let intents = GatewayIntents::non_privileged() | GatewayIntents::GUILD_MEMBERS;

    let framework = Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                settings::settings(),
                autorole::autorole(),
                say::say(),
                standing::standing(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                let commands = &framework.options().commands;
                match dev_guild {
                    Some(guild_id) => {
                        poise::builtins::register_in_guild(ctx, commands, guild_id).await?
                    }
                    None => poise::builtins::register_globally(ctx, commands).await?,
                }
                AppState::new(&database_url, owners, ctx.http.clone()).await
            })
        })
        .build();

    let mut client = ClientBuilder::new(discord_token, intents)
        .framework(framework)
        .await
        .context("Failed to build Discord client")?;

    client.start().await.context("Error while running client")
}
