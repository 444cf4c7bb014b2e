//! A small EPMD inspection CLI.
//!
//! # Usage Examples
//!
//! ```bash
//! $ cargo run --example epmd_cli -- --help
//! $ cargo run --example epmd_cli -- names
//! $ cargo run --example epmd_cli -- info foo
//! ```
use clap::Parser;

#[derive(Debug, Parser)]
#[clap(name = "epmd_cli")]
struct Args {
    #[clap(long, short = 'H', default_value = "127.0.0.1")]
    epmd_host: String,

    #[clap(long, short = 'p', default_value_t = erl_dist::epmd::DEFAULT_EPMD_PORT)]
    epmd_port: u16,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Lists every node currently registered with EPMD.
    Names,
    /// Looks up a single node's registration by name.
    Info { node_name: String },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    smol::block_on(async {
        let stream =
            smol::net::TcpStream::connect((args.epmd_host.as_str(), args.epmd_port)).await?;
        let client = erl_dist::epmd::EpmdClient::new(stream);

        match args.command {
            Command::Names => {
                for (name, port) in client.get_names().await? {
                    println!("{name} at port {port}");
                }
            }
            Command::Info { node_name } => match client.get_node_info(&node_name).await? {
                Some(info) => println!("{info:?}"),
                None => println!("no such node: {node_name}"),
            },
        }
        Ok(())
    })
}
