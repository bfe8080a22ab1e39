pub mod command;
pub mod config;
pub mod dataset;
pub mod error;
pub mod paths;
pub mod run;
pub mod tags;

// Re-export common types
pub use config::{load_json, TrainingOptions};
pub use error::LaunchError;
pub use run::{RunPlan, SubprocessTrainer, Trainer};

pub mod logging {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    pub fn init_logger() {
        Builder::new()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{} [{}] - {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                    record.level(),
                    record.args()
                )
            })
            .filter(None, LevelFilter::Info)
            .init();
    }
}
