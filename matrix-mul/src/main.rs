use std::env;

use matrix_mul::{Config, Error, Launcher, MatrixMul, Product, Strategy, bench, report, worker};
use tracing::error;
use tracing_subscriber::EnvFilter;

const DEFAULT_SIZES: &str = "10,100,1000,2000,2500,3000";
const DEFAULT_WORKERS: &str = "10,100,1000";
const PRINT_LIMIT: usize = 10;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let mode = args.get(1).cloned().unwrap_or_else(|| "bench".to_string());

    match mode.as_str() {
        worker::WORKER_COMMAND => {
            let (region, id) = worker::parse_args(&args[2..])?;
            if let Err(e) = worker::run_process(region, id) {
                error!(worker = id, region = %region.display(), "{e}");
                std::process::exit(1);
            }
        }
        "bench" => {
            let config = Config::from_env_or(Launcher::CurrentExe)?;
            let sizes = parse_list(args.get(2), DEFAULT_SIZES)?;
            let workers = parse_list(args.get(3), DEFAULT_WORKERS)?;
            let mut mm = MatrixMul::new(&config);

            for &size in &sizes {
                println!("\nMatrix size: {size}x{size}");
                let comparison = bench::compare(&mut mm, size, &workers, print_product)?;
                report::write_data_file(&config.output_dir, &comparison)?;
                report::write_gnuplot_script(&config.output_dir, size)?;
            }

            println!("Data files and gnuplot scripts have been generated.");
            println!("To create the plots, run the following commands:");
            for size in &sizes {
                println!("gnuplot {}", report::script_file_name(*size));
            }
        }
        "run" => {
            let strategy: Strategy = args
                .get(2)
                .ok_or_else(|| Error::Usage("run needs a strategy".to_string()))?
                .parse()?;
            let size: usize = args.get(3).map_or(Ok(2), |s| s.parse())?;
            let workers: usize = args.get(4).map_or(Ok(4), |s| s.parse())?;

            let mut mm = MatrixMul::new(&Config::from_env_or(Launcher::CurrentExe)?);
            let product = mm.run(strategy, size, workers)?;
            print_product(strategy, workers, &product);
        }
        _ => {
            eprintln!("Unknown mode: {}", mode);
            eprintln!("Usage: {} <mode> [args...]", args[0]);
            eprintln!("Modes:");
            eprintln!("  bench [sizes] [workers]              - Compare all strategies (default)");
            eprintln!("  run <sequential|row|element> <size> [workers]");
            eprintln!("                                       - Run one strategy once");
            eprintln!("  worker <region-path> <worker-id>     - Internal worker process");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Parses a comma-separated list of positive integers.
fn parse_list(arg: Option<&String>, default: &str) -> Result<Vec<usize>, Error> {
    arg.map_or(default, String::as_str)
        .split(',')
        .map(|item| match item.trim().parse::<usize>() {
            Ok(0) | Err(_) => Err(Error::Usage(format!("'{item}' is not a positive integer"))),
            Ok(n) => Ok(n),
        })
        .collect()
}

fn print_product(strategy: Strategy, workers: usize, product: &Product) {
    let micros = product.elapsed_micros();
    match strategy {
        Strategy::Sequential => println!("{strategy}: {micros:.2} microseconds"),
        Strategy::Parallel(_) => {
            println!("{strategy} ({workers} processes): {micros:.2} microseconds")
        }
    }
    if product.result.size() <= PRINT_LIMIT {
        println!("Matrix A:\n{}", product.operands.a);
        println!("Matrix B:\n{}", product.operands.b);
        println!("Result ({strategy}):\n{}", product.result);
    }
}
