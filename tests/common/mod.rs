#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ripit::config::Config;
use ripit::device::DeviceOps;
use ripit::error::{Result, RipitError};
use ripit::executor::{CommandExecutor, CommandOutput, DeviceCommand};
use ripit::workflow::RipWorkflow;

type Handler = Box<dyn Fn(&DeviceCommand) -> CommandOutput + Send + Sync>;
type Selector = Box<dyn Fn(&DeviceCommand) -> bool + Send + Sync>;

/// Executor answering from a closure and recording every command it saw
pub struct ScriptedExecutor {
    handler: Handler,
    unspawnable: Option<Selector>,
    calls: Mutex<Vec<DeviceCommand>>,
}

impl ScriptedExecutor {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&DeviceCommand) -> CommandOutput + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            unspawnable: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Like `new`, but commands matching `unspawnable` fail as if their
    /// binary were missing
    pub fn with_spawn_failures<F, S>(handler: F, unspawnable: S) -> Arc<Self>
    where
        F: Fn(&DeviceCommand) -> CommandOutput + Send + Sync + 'static,
        S: Fn(&DeviceCommand) -> bool + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            unspawnable: Some(Box::new(unspawnable)),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<DeviceCommand> {
        self.calls.lock().unwrap().clone()
    }

    /// (slot, drive) pairs of every changer command with the given verb
    pub fn changer_calls(&self, verb: &str) -> Vec<(u32, usize)> {
        self.calls()
            .iter()
            .filter_map(|cmd| changer_request(cmd).filter(|(v, _, _)| *v == verb))
            .map(|(_, slot, drive)| (slot, drive))
            .collect()
    }

    pub fn extract_calls(&self) -> Vec<DeviceCommand> {
        self.calls().into_iter().filter(|cmd| cmd.has_arg("--mirror")).collect()
    }

    pub fn probe_calls(&self) -> usize {
        self.calls().iter().filter(|cmd| cmd.program == "findmnt").count()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, command: &DeviceCommand) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.clone());
        if self.unspawnable.as_ref().is_some_and(|broken| broken(command)) {
            return Err(RipitError::Spawn {
                program: command.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
            });
        }
        Ok((self.handler)(command))
    }
}

/// Decode `mtx -f <dev> <verb> <slot> <drive>`
pub fn changer_request(cmd: &DeviceCommand) -> Option<(&str, u32, usize)> {
    if cmd.program != "mtx" || cmd.args.len() != 5 {
        return None;
    }
    let slot = cmd.args[3].parse().ok()?;
    let drive = cmd.args[4].parse().ok()?;
    Some((cmd.args[2].as_str(), slot, drive))
}

pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput::exited(0, stdout, "")
}

pub fn fail(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput::exited(code, "", stderr)
}

/// Answer for a healthy jukebox: everything succeeds, discs mount at once
pub fn healthy(cmd: &DeviceCommand) -> CommandOutput {
    if cmd.program == "findmnt" {
        ok("/media/SAMPLE_DISC\n")
    } else if cmd.has_arg("--info") {
        ok("DVD-Video information of the DVD with title \"SAMPLE_DISC\"\n")
    } else {
        ok("")
    }
}

/// Default configuration writing into `dir` and polling without delay
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.output.log_dir = dir.to_path_buf();
    config.extractor.output_dir = dir.to_path_buf();
    config.mount.poll_interval_secs = 0;
    config.mount.timeout_secs = Some(5);
    config
}

pub fn workflow(config: Config, executor: Arc<ScriptedExecutor>) -> Arc<RipWorkflow> {
    let ops = DeviceOps::new(Arc::new(config), executor).unwrap();
    Arc::new(RipWorkflow::new(ops))
}
