use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = tarentula::Args::parse();
	tarentula::run(args).await
}
