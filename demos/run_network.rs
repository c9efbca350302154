//! Headless network run.
//!
//! Loads the settings profile given on the command line (or the default
//! one), amends the network config for its dataset and runs the training or
//! inference script until it exits, echoing its output.
//!
//! ```text
//! cargo run --example run_network -- [train|infer] [profile]
//! ```

use std::thread;
use std::time::Duration;

use bevy::app::App;
use bevy::log::{error, LogPlugin};
use bevy_pose_annotator::{
    CachingModelManager, JsonLoadAndStoreStrategy, NetworkController, NetworkRequest,
    NetworkStatus, SettingsStore, DEFAULT_PROFILE,
};

fn main() {
    // Installs the log subscriber; the app itself is never run.
    App::new().add_plugins(LogPlugin::default());

    let mut args = std::env::args().skip(1);
    let train = match args.next().as_deref() {
        Some("train") => true,
        Some("infer") | None => false,
        Some(other) => {
            error!("unknown task {other}, expected train or infer");
            std::process::exit(2);
        }
    };
    let profile = args.next().unwrap_or_else(|| DEFAULT_PROFILE.to_owned());

    let settings = match SettingsStore::open_default() {
        Ok(store) => store.load_settings(&profile),
        Err(err) => {
            error!("{err}");
            std::process::exit(1);
        }
    };

    let mut manager = CachingModelManager::new(JsonLoadAndStoreStrategy::new(settings.store_paths()));
    manager.reload();
    let request = NetworkRequest::new(
        &settings.network_config_path,
        settings.store_paths(),
        manager.images(),
    );

    let mut controller = NetworkController::from_settings(&settings);
    let started = if train {
        controller.training(&request)
    } else {
        controller.inference(&request)
    };
    if let Err(err) = started {
        error!("{err}");
        std::process::exit(1);
    }

    loop {
        match controller.poll() {
            NetworkStatus::Finished(outcome) => {
                std::process::exit(outcome.exit_code.unwrap_or(1));
            }
            NetworkStatus::Idle => break,
            NetworkStatus::Running(_) => thread::sleep(Duration::from_millis(100)),
        }
    }
}
