//! Loopback pairing demo
//!
//! Drives a full session against the in-process wallet and prints each store
//! snapshot as JSON:
//!
//!   cargo run --example loopback            connect → approve → update → disconnect
//!   cargo run --example loopback -- --follow  stay paired until Ctrl+C
//!
//! Configuration comes from `BEEPAIR_*` (see `PairingConfig::from_env`).

use async_trait::async_trait;
use beepair::logging::init_logging;
use beepair::{
    install_signal_handlers, Asset, LocalAccount, LogPresenter, MemoryTransport, MemoryWallet, PairingConfig,
    Session, SessionController, StaticAssetQuery,
};
use std::sync::Arc;
use std::time::Duration;

struct DemoAccount;

#[async_trait]
impl LocalAccount for DemoAccount {
    async fn address(&self) -> beepair::Result<String> {
        Ok("0x00000000000000000000000000000000000000d0".into())
    }
}

const ALICE: &str = "0x00000000000000000000000000000000000000aa";
const BOB: &str = "0x00000000000000000000000000000000000000bb";

fn print(label: &str, session: &Session) -> anyhow::Result<()> {
    println!("{label}: {}", serde_json::to_string_pretty(session)?);
    Ok(())
}

async fn settled(controller: &SessionController, address: &str) -> anyhow::Result<Arc<Session>> {
    let mut watch = controller.subscribe();
    let wait = watch.wait_for(|s| s.bound_address.as_deref() == Some(address) && !s.pending_fetch);
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await?
        .ok_or_else(|| anyhow::anyhow!("session store closed"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let follow = std::env::args().any(|arg| arg == "--follow");

    let config = PairingConfig::from_env()?;
    let wallet = MemoryWallet::new();
    let transport = MemoryTransport::new(wallet.clone()).with_presenter(Arc::new(LogPresenter));
    let assets = StaticAssetQuery::new()
        .with(ALICE, 1, vec![Asset::new("ETH", "1500000000000000000")])
        .with(BOB, 4, vec![Asset::new("ETH", "42"), Asset::new("DAI", "1000")]);

    let controller = SessionController::new(config, Arc::new(transport), Arc::new(assets))
        .with_local_account(Arc::new(DemoAccount));

    let outcome = controller.connect().await?;
    tracing::info!(?outcome, "connect returned");
    print("pairing", &controller.session())?;

    wallet.approve(vec![ALICE.into()], 1);
    print("connected", &*settled(&controller, ALICE).await?)?;

    wallet.update(vec![BOB.into()], 4);
    print("updated", &*settled(&controller, BOB).await?)?;

    if follow {
        let shutdown = install_signal_handlers();
        tracing::info!("following session, Ctrl+C to disconnect");
        let mut watch = controller.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                changed = watch.changed() => match changed {
                    Some(session) => print("changed", &session)?,
                    None => break,
                },
            }
        }
        controller.disconnect().await;
    } else {
        wallet.disconnect();
        let mut watch = controller.subscribe();
        tokio::time::timeout(Duration::from_secs(5), watch.wait_for(|s| !s.connected)).await?;
    }

    if let Some(fault) = controller.fault() {
        tracing::warn!(error = %fault, "session ended with a transport fault");
    }
    print("final", &controller.session())?;
    Ok(())
}
