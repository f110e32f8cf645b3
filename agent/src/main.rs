mod agent;
mod clock;
mod gate;
mod host;
mod identity;
mod reporter;
mod sensor;
mod shutdown;
mod update;

#[cfg(test)]
mod testutil;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
