mod config;

use bot::{lifecycle::Lifecycle, sender, Bot};
use config::Config;
use tokio::runtime::Runtime;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let Config { endpoint, identity, autojoin, settings, line_rate, trivia_url } = Config::from_env()?;

    // Initialize the engine
    let bank = bank::Client::new(&trivia_url)?;
    let (outbox, uplink, pacer) = sender::channel(line_rate);
    let bot = Bot::new(bank, outbox, &identity.nick, settings);
    let lifecycle = Lifecycle::new(bot.clone(), uplink, endpoint, identity, autojoin);

    // Run until told to quit
    let runtime = Runtime::new()?;
    runtime.block_on(async move {
        tokio::spawn(pacer.run());
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => bot.request_shutdown(),
                Err(err) => log::error!("cannot listen for Ctrl-C: {err}"),
            }
        });
        lifecycle.run().await;
    });

    Ok(())
}
