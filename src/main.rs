use std::time::Duration;

use clap::Parser;
use indicatif::ProgressBar;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_appender::non_blocking;
use time::macros::format_description;

use torrent::{add_torrent, parse_torrent, ClientConfig, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(name="torrentium", version)]
struct Args {
    #[arg(short, long, help="Print contents of torrent file")]
    inspect: bool,

    #[arg(short, long, default_value_t = DEFAULT_PORT, help="Port reported to trackers")]
    port: u16,

    #[arg(short, long, default_value_t = 5, help="Seconds to wait on each tracker and peer")]
    timeout: u64,

    file: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let filename = args.file;

    let file_appender = tracing_appender::rolling::never("logs", "torrent.log");
    let (non_blocking, _guard) = non_blocking(file_appender);
    let timer = LocalTime::new(
        format_description!("[month]/[day]/[year] [hour repr:24]:[minute]:[second].[subsecond digits:4]"));
    tracing_subscriber::fmt().with_writer(non_blocking).with_ansi(false).with_timer(timer).init();

    if args.inspect {
        match parse_torrent(&filename) {
            Ok(torrent) => println!("Contents of {}:\n{}", &filename, torrent),
            Err(e) => println!("Unable to parse file: {e}"),
        }
        return;
    }

    let config = ClientConfig::default()
        .with_port(args.port)
        .with_timeout(Duration::from_secs(args.timeout));

    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("discovering peers for {}", &filename));
    spinner.enable_steady_tick(Duration::from_millis(100));
    let result = add_torrent(&filename, &config).await;
    spinner.finish_and_clear();

    match result {
        Ok(torrent) => print!("{}", torrent),
        Err(e) => println!("Unable to add {}: {e}", &filename),
    }
}
