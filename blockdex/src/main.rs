use blockdex::ExperimentConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blockdex=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let config = match ExperimentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: data_path={}, block_sizes={:?}, memory_size={}",
        config.data_path.display(),
        config.block_sizes,
        config.memory_size
    );

    let reports = match blockdex::experiment::run(&config) {
        Ok(reports) => reports,
        Err(e) => {
            tracing::error!("Experiment failed: {e}");
            std::process::exit(1);
        }
    };

    println!("Running Application");
    for report in reports {
        println!();
        print!("{report}");
    }
}
