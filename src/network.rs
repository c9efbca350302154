//! Bridge to external training and inference scripts.
//!
//! A run amends the script's JSON config with the current data locations and
//! then executes `<interpreter> <script> --config <path>` on Bevy's async
//! compute pool. Standard output is collected line by line for logging; the
//! exit status is reported but carries no further meaning.
//!
//! On unix the script runs in its own process group, so stopping a run also
//! ends whatever the script started.

use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bevy::prelude::*;
use bevy::tasks::futures_lite::future;
use bevy::tasks::{block_on, AsyncComputeTaskPool, Task, TaskPool};
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::NetworkError;
use crate::model::Image;
use crate::store::{StorePaths, CAMERA_INFO_FILE};

/// File written next to the network config listing the images to process.
pub const IMAGE_LIST_FILE: &str = "image_list.json";

/// How often the worker checks for process exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long output is still read after the script exited on its own.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Everything a run needs to amend the config.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkRequest {
    /// JSON config handed to the script.
    pub config_path: PathBuf,
    /// Current data locations.
    pub paths: StorePaths,
    /// Images the script should process.
    pub image_paths: Vec<PathBuf>,
}

impl NetworkRequest {
    /// Request covering all `images`.
    pub fn new(config_path: impl Into<PathBuf>, paths: StorePaths, images: &[Arc<Image>]) -> Self {
        Self {
            config_path: config_path.into(),
            paths,
            image_paths: images.iter().map(|image| image.absolute_image_path()).collect(),
        }
    }
}

fn path_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}

/// Rewrites the config at `request.config_path` in place with the computed
/// paths, keeping every other key. A missing config starts out empty.
pub fn amend_network_config(request: &NetworkRequest) -> Result<(), NetworkError> {
    let config_path = &request.config_path;
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| NetworkError::Io { path, source }
    };
    let json_err = |source| NetworkError::Json {
        path: config_path.clone(),
        source,
    };

    let mut config = if config_path.exists() {
        let data = fs::read_to_string(config_path).map_err(io_err(config_path.as_path()))?;
        match serde_json::from_str::<Value>(&data).map_err(json_err)? {
            Value::Object(map) => map,
            _ => return Err(NetworkError::MalformedConfig(config_path.clone())),
        }
    } else {
        Map::new()
    };

    let image_list_path = config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(IMAGE_LIST_FILE);
    let image_list = Value::Array(request.image_paths.iter().map(|p| path_value(p)).collect());
    let image_list_data = serde_json::to_string_pretty(&image_list).map_err(json_err)?;
    fs::write(&image_list_path, image_list_data).map_err(io_err(&image_list_path))?;

    let paths = &request.paths;
    config.insert("images_path".into(), path_value(&paths.images_path));
    config.insert(
        "segmentation_images_path".into(),
        paths
            .segmentation_images_path
            .as_deref()
            .map(path_value)
            .unwrap_or(Value::Null),
    );
    config.insert(
        "camera_info_path".into(),
        path_value(&paths.images_path.join(CAMERA_INFO_FILE)),
    );
    config.insert("output_path".into(), path_value(&paths.poses_file_path));
    config.insert("image_list_path".into(), path_value(&image_list_path));

    let data = serde_json::to_string_pretty(&Value::Object(config)).map_err(json_err)?;
    fs::write(config_path, data).map_err(io_err(config_path.as_path()))
}

/// Which script a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkTask {
    /// The training script.
    Training,
    /// The inference script.
    Inference,
}

impl fmt::Display for NetworkTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkTask::Training => f.write_str("training"),
            NetworkTask::Inference => f.write_str("inference"),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkOutcome {
    /// Script that ran.
    pub task: NetworkTask,
    /// Exit code, `None` if killed by a signal or not observable.
    pub exit_code: Option<i32>,
    /// The run was stopped with [`NetworkController::stop`].
    pub stopped: bool,
}

/// Result of [`NetworkController::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkStatus {
    /// Nothing is running.
    Idle,
    /// A run is in progress.
    Running(NetworkTask),
    /// A run ended since the last poll.
    Finished(NetworkOutcome),
}

struct NetworkRun {
    task: NetworkTask,
    worker: Task<Option<ExitStatus>>,
    output: Arc<Mutex<Vec<String>>>,
    child: Arc<Mutex<Child>>,
    stopped: Arc<AtomicBool>,
}

/// Starts, watches and stops the external scripts.
#[derive(Resource)]
pub struct NetworkController {
    interpreter: PathBuf,
    training_script: PathBuf,
    inference_script: PathBuf,
    run: Option<NetworkRun>,
    log: Vec<String>,
}

impl NetworkController {
    /// Controller running scripts with `interpreter`.
    pub fn new(
        interpreter: impl Into<PathBuf>,
        training_script: impl Into<PathBuf>,
        inference_script: impl Into<PathBuf>,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            training_script: training_script.into(),
            inference_script: inference_script.into(),
            run: None,
            log: Vec::new(),
        }
    }

    /// Controller for the scripts of a settings profile.
    pub fn from_settings(settings: &crate::settings::Settings) -> Self {
        Self::new(
            &settings.python_interpreter_path,
            &settings.training_script_path,
            &settings.inference_script_path,
        )
    }

    /// Output lines collected so far, across runs.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Clears the collected output.
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Amends the config and starts the training script.
    pub fn training(&mut self, request: &NetworkRequest) -> Result<(), NetworkError> {
        self.start(NetworkTask::Training, request)
    }

    /// Amends the config and starts the inference script.
    pub fn inference(&mut self, request: &NetworkRequest) -> Result<(), NetworkError> {
        self.start(NetworkTask::Inference, request)
    }

    fn start(&mut self, task: NetworkTask, request: &NetworkRequest) -> Result<(), NetworkError> {
        let script = match task {
            NetworkTask::Training => self.training_script.clone(),
            NetworkTask::Inference => self.inference_script.clone(),
        };
        if self.interpreter.as_os_str().is_empty() {
            return Err(NetworkError::NotConfigured("interpreter"));
        }
        if script.as_os_str().is_empty() {
            return Err(NetworkError::NotConfigured(match task {
                NetworkTask::Training => "training script",
                NetworkTask::Inference => "inference script",
            }));
        }

        amend_network_config(request)?;

        if self.run.is_some() {
            info!("stopping the running network script before starting {task}");
            self.stop();
            self.wait_for_stop();
        }

        info!(
            "running {} {} --config {}",
            self.interpreter.display(),
            script.display(),
            request.config_path.display()
        );
        let mut command = Command::new(&self.interpreter);
        command
            .arg(&script)
            .arg("--config")
            .arg(&request.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command.spawn().map_err(|source| NetworkError::Spawn {
            program: self.interpreter.display().to_string(),
            source,
        })?;

        let output = Arc::new(Mutex::new(Vec::new()));
        let reader = match child.stdout.take() {
            Some(stdout) => Some(spawn_output_reader(stdout, Arc::clone(&output))?),
            None => None,
        };
        let child = Arc::new(Mutex::new(child));
        let stopped = Arc::new(AtomicBool::new(false));

        let worker_child = Arc::clone(&child);
        let worker_stopped = Arc::clone(&stopped);
        let pool = AsyncComputeTaskPool::get_or_init(TaskPool::new);
        let worker = pool.spawn(async move {
            // Exit is detected with `try_wait`, never by the end of stdout,
            // which a leftover grandchild may keep open.
            let status = loop {
                match worker_child.lock().try_wait() {
                    Ok(Some(status)) => break Some(status),
                    Ok(None) => {}
                    Err(err) => {
                        warn!("failed to wait for network script: {err}");
                        break None;
                    }
                }
                thread::sleep(EXIT_POLL_INTERVAL);
            };
            if let Some(reader) = reader {
                let deadline = Instant::now() + OUTPUT_DRAIN_TIMEOUT;
                while !reader.is_finished()
                    && !worker_stopped.load(Ordering::SeqCst)
                    && Instant::now() < deadline
                {
                    thread::sleep(EXIT_POLL_INTERVAL);
                }
            }
            status
        });

        self.run = Some(NetworkRun {
            task,
            worker,
            output,
            child,
            stopped,
        });
        Ok(())
    }

    /// Kills the running script, if any. The run is reported as finished by
    /// the next [`poll`](Self::poll).
    pub fn stop(&mut self) {
        let Some(run) = &self.run else {
            return;
        };
        run.stopped.store(true, Ordering::SeqCst);
        if let Err(err) = kill_process_tree(&mut run.child.lock()) {
            warn!("failed to stop network script: {err}");
        }
    }

    fn wait_for_stop(&mut self) {
        while self.run.is_some() {
            if let NetworkStatus::Running(_) = self.poll() {
                std::thread::sleep(EXIT_POLL_INTERVAL);
            }
        }
    }

    fn drain_output(&mut self) {
        let Some(run) = &self.run else {
            return;
        };
        let lines = std::mem::take(&mut *run.output.lock());
        for line in lines {
            info!("[{}] {line}", run.task);
            self.log.push(line);
        }
    }

    /// Moves new output into the log and reports the run state. A finished
    /// run is reported exactly once.
    pub fn poll(&mut self) -> NetworkStatus {
        self.drain_output();
        let Some(run) = &mut self.run else {
            return NetworkStatus::Idle;
        };
        let Some(status) = block_on(future::poll_once(&mut run.worker)) else {
            return NetworkStatus::Running(run.task);
        };

        // Lines written between the last drain and exit.
        self.drain_output();
        let Some(run) = self.run.take() else {
            return NetworkStatus::Idle;
        };
        let outcome = NetworkOutcome {
            task: run.task,
            exit_code: status.and_then(|status| status.code()),
            stopped: run.stopped.load(Ordering::SeqCst),
        };
        match outcome.exit_code {
            Some(0) => info!("network {} finished", outcome.task),
            Some(code) => warn!("network {} exited with code {code}", outcome.task),
            None if outcome.stopped => info!("network {} stopped", outcome.task),
            None => warn!("network {} ended without exit code", outcome.task),
        }
        NetworkStatus::Finished(outcome)
    }
}

/// Reads `stdout` line by line into `output` until the pipe closes.
fn spawn_output_reader(
    stdout: ChildStdout,
    output: Arc<Mutex<Vec<String>>>,
) -> Result<JoinHandle<()>, NetworkError> {
    thread::Builder::new()
        .name("network-output".into())
        .spawn(move || {
            for line in BufReader::new(stdout).lines() {
                match line {
                    Ok(line) => output.lock().push(line),
                    Err(err) => {
                        warn!("failed to read network script output: {err}");
                        break;
                    }
                }
            }
        })
        .map_err(|source| NetworkError::Spawn {
            program: "network output reader".into(),
            source,
        })
}

/// Kills the script together with its process group.
fn kill_process_tree(child: &mut Child) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let killed = Command::new("kill")
            .args(["-s", "KILL", "--", group.as_str()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match killed {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => debug!("kill {group} exited with {status}, killing the script only"),
            Err(err) => debug!("could not run kill for {group}: {err}"),
        }
    }
    child.kill()
}

impl Drop for NetworkController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drain network output and report finished runs each frame.
pub fn poll_network(controller: Option<ResMut<NetworkController>>) {
    if let Some(mut controller) = controller {
        controller.poll();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(dir: &Path) -> NetworkRequest {
        let paths = StorePaths {
            images_path: dir.join("images"),
            segmentation_images_path: None,
            object_models_path: dir.join("models"),
            poses_file_path: dir.join("poses.json"),
        };
        let images = vec![Arc::new(Image::new(
            "1.png",
            None,
            dir.join("images"),
            Mat3::IDENTITY,
        ))];
        NetworkRequest::new(dir.join("config.json"), paths, &images)
    }

    #[test]
    fn config_is_amended_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let request = request(dir.path());
        fs::write(&request.config_path, r#"{ "epochs": 3, "images_path": "old" }"#).unwrap();

        amend_network_config(&request).unwrap();

        let config: Value =
            serde_json::from_str(&fs::read_to_string(&request.config_path).unwrap()).unwrap();
        assert_eq!(config["epochs"], 3);
        assert_eq!(
            config["images_path"],
            path_value(&dir.path().join("images"))
        );
        assert_eq!(
            config["camera_info_path"],
            path_value(&dir.path().join("images").join("info.json"))
        );
        assert_eq!(config["output_path"], path_value(&dir.path().join("poses.json")));
        assert_eq!(config["segmentation_images_path"], Value::Null);

        let list_path = dir.path().join(IMAGE_LIST_FILE);
        assert_eq!(config["image_list_path"], path_value(&list_path));
        let list: Vec<String> =
            serde_json::from_str(&fs::read_to_string(list_path).unwrap()).unwrap();
        assert_eq!(list.len(), 1);
        assert!(list[0].ends_with("1.png"));
    }

    #[test]
    fn non_object_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let request = request(dir.path());
        fs::write(&request.config_path, "[1, 2]").unwrap();
        assert!(matches!(
            amend_network_config(&request),
            Err(NetworkError::MalformedConfig(_))
        ));
    }

    #[test]
    fn unconfigured_controller_does_not_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = NetworkController::new("", "train.py", "infer.py");
        assert!(matches!(
            controller.training(&request(dir.path())),
            Err(NetworkError::NotConfigured("interpreter"))
        ));
        assert_eq!(controller.poll(), NetworkStatus::Idle);
    }

    #[cfg(unix)]
    #[test]
    fn script_output_is_collected_until_exit() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("train.sh");
        fs::write(&script, "echo epoch 1\necho \"$1 $2\"\nexit 3\n").unwrap();
        let request = request(dir.path());
        let mut controller = NetworkController::new("sh", &script, "");

        controller.training(&request).unwrap();
        assert!(controller.is_running());

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        let outcome = loop {
            match controller.poll() {
                NetworkStatus::Finished(outcome) => break outcome,
                NetworkStatus::Running(task) => assert_eq!(task, NetworkTask::Training),
                NetworkStatus::Idle => panic!("run vanished"),
            }
            assert!(std::time::Instant::now() < deadline, "script did not finish");
            std::thread::sleep(Duration::from_millis(10));
        };

        assert_eq!(outcome.task, NetworkTask::Training);
        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.stopped);
        assert_eq!(controller.log()[0], "epoch 1");
        assert_eq!(
            controller.log()[1],
            format!("--config {}", request.config_path.display())
        );
        assert!(!controller.is_running());
        assert_eq!(controller.poll(), NetworkStatus::Idle);
    }

    #[cfg(unix)]
    fn wait_for_outcome(controller: &mut NetworkController, timeout: Duration) -> NetworkOutcome {
        let deadline = Instant::now() + timeout;
        loop {
            if let NetworkStatus::Finished(outcome) = controller.poll() {
                return outcome;
            }
            assert!(Instant::now() < deadline, "run did not finish in {timeout:?}");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[cfg(unix)]
    #[test]
    fn stop_ends_children_started_by_the_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("infer.sh");
        fs::write(&script, "echo waiting\nsleep 8\necho done\n").unwrap();
        let mut controller = NetworkController::new("sh", "", &script);

        controller.inference(&request(dir.path())).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !controller.log().iter().any(|line| line == "waiting") {
            assert_eq!(controller.poll(), NetworkStatus::Running(NetworkTask::Inference));
            assert!(Instant::now() < deadline, "script produced no output");
            thread::sleep(Duration::from_millis(10));
        }
        controller.stop();

        let outcome = wait_for_outcome(&mut controller, Duration::from_secs(3));
        assert!(outcome.stopped);
        assert!(!controller.log().iter().any(|line| line == "done"));
    }

    #[cfg(unix)]
    #[test]
    fn restarting_replaces_a_long_run_without_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let long = dir.path().join("train.sh");
        fs::write(&long, "sleep 8\necho late\n").unwrap();
        let short = dir.path().join("infer.sh");
        fs::write(&short, "echo inferred\n").unwrap();
        let request = request(dir.path());
        let mut controller = NetworkController::new("sh", &long, &short);

        controller.training(&request).unwrap();
        let started = Instant::now();
        controller.inference(&request).unwrap();
        assert!(started.elapsed() < Duration::from_secs(3));

        let outcome = wait_for_outcome(&mut controller, Duration::from_secs(5));
        assert_eq!(outcome.task, NetworkTask::Inference);
        assert_eq!(outcome.exit_code, Some(0));
        assert!(controller.log().iter().any(|line| line == "inferred"));
        assert!(!controller.log().iter().any(|line| line == "late"));
    }

    #[cfg(unix)]
    #[test]
    fn stopped_run_reports_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("infer.sh");
        fs::write(&script, "echo waiting\nexec sleep 30\n").unwrap();
        let mut controller = NetworkController::new("sh", "", &script);

        controller.inference(&request(dir.path())).unwrap();
        controller.stop();

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        let outcome = loop {
            if let NetworkStatus::Finished(outcome) = controller.poll() {
                break outcome;
            }
            assert!(std::time::Instant::now() < deadline, "script was not stopped");
            std::thread::sleep(Duration::from_millis(10));
        };
        assert_eq!(outcome.task, NetworkTask::Inference);
        assert!(outcome.stopped);
        assert_eq!(outcome.exit_code, None);
    }
}
