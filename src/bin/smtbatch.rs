use std::{env, process};

fn main() {
    let args: Vec<String> = env::args().collect();

    let config = smtbatch::BatchConfig::new(&args).unwrap_or_else(|err| {
        eprintln!("Problem parsing arguments: {}", err);
        process::exit(1);
    });

    config.run().unwrap_or_else(|err| {
        eprintln!("Problem while running: {}", err);
        process::exit(1);
    });
}
