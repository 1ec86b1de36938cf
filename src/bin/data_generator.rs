use rand::Rng;
use std::env;
use std::fs::{self, File};
use std::io::{BufWriter, Write};

/// Writes synthetic trade lines: `<ticker> <day> <price> <volume> <venue>`.
fn main() -> std::io::Result<()> {
    let mut args = env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "data/trades_10m.txt".to_string());
    let rows: usize = args
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(10_000_000);

    if let Some(dir) = std::path::Path::new(&path).parent() {
        fs::create_dir_all(dir)?;
    }
    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);

    let tickers = ["AAPL", "MSFT", "AMZN", "GOOG", "META", "NVDA", "TSLA", "BRK.B"];
    let venues = ["XNAS", "XNYS", "ARCX", "BATS", "IEXG", "EDGX"];

    let mut rng = rand::rng();
    for i in 0..rows {
        let ticker = tickers[rng.random_range(0..tickers.len())];
        let day = 1 + i * 250 / rows.max(1);
        let price = rng.random_range(10.0..1000.0_f64);
        let volume = rng.random_range(1..100_000);
        let venue = venues[rng.random_range(0..venues.len())];
        writeln!(writer, "{ticker} {day} {price:.2} {volume}\t{venue}")?;
    }
    writer.flush()?;

    println!("Sample input generated: {path} ({rows} rows)");
    Ok(())
}
