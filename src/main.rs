use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cfg = passbound::config::Config::parse();
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            if cfg.wipe {
                passbound::wipe(cfg).await
            } else {
                passbound::run(cfg).await
            }
        })
}
