use std::fmt;
use std::path::Path;

use crate::config::Config;

/// Abstract external command representation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCommand {
    pub program: String,
    pub args: Vec<String>,
    pub description: String,
}

impl DeviceCommand {
    /// Create a new command
    pub fn new<S1: Into<String>, S2: Into<String>>(program: S1, description: S2) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add a `--key=value` option
    pub fn option<S: fmt::Display>(self, key: &str, value: S) -> Self {
        self.arg(format!("--{}={}", key, value))
    }

    /// Add a path argument
    pub fn path<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Whether the argument list contains `value` verbatim
    pub fn has_arg(&self, value: &str) -> bool {
        self.args.iter().any(|a| a == value)
    }

    /// Value of a `--key=value` option, if present
    pub fn option_value(&self, key: &str) -> Option<&str> {
        let prefix = format!("--{}=", key);
        self.args.iter().find_map(|a| a.strip_prefix(prefix.as_str()))
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Builder for the jukebox commands: changer control, mount probe, extraction
#[derive(Debug, Clone)]
pub struct DeviceCommandBuilder {
    changer_binary: String,
    changer_device: String,
    probe_binary: String,
    probe_args: Vec<String>,
    extractor_binary: String,
}

impl DeviceCommandBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            changer_binary: config.carousel.binary_path.clone(),
            changer_device: config.carousel.device.clone(),
            probe_binary: config.mount.probe_binary.clone(),
            probe_args: config.mount.probe_args.clone(),
            extractor_binary: config.extractor.binary_path.clone(),
        }
    }

    fn changer<S: Into<String>>(&self, description: S) -> DeviceCommand {
        DeviceCommand::new(&self.changer_binary, description)
            .arg("-f")
            .arg(&self.changer_device)
    }

    /// Move a disc from a slot into a drive
    pub fn load(&self, slot: u32, drive: usize) -> DeviceCommand {
        self.changer(format!("Load slot {} into drive {}", slot, drive))
            .arg("load")
            .arg(slot.to_string())
            .arg(drive.to_string())
    }

    /// Move the disc in a drive into a slot
    pub fn unload(&self, slot: u32, drive: usize) -> DeviceCommand {
        self.changer(format!("Unload drive {} into slot {}", drive, slot))
            .arg("unload")
            .arg(slot.to_string())
            .arg(drive.to_string())
    }

    /// Query the changer inventory
    pub fn status(&self) -> DeviceCommand {
        self.changer("Changer status").arg("status")
    }

    /// Ask where a drive's filesystem is mounted
    pub fn mount_probe(&self, device: &str) -> DeviceCommand {
        DeviceCommand::new(&self.probe_binary, format!("Mount probe for {}", device))
            .args(self.probe_args.iter().cloned())
            .arg(device)
    }

    /// Describe the disc structure in a drive
    pub fn disc_info(&self, device: &str) -> DeviceCommand {
        DeviceCommand::new(&self.extractor_binary, format!("Disc info for {}", device))
            .arg("--info")
            .option("input", device)
    }

    /// Mirror a disc into the output directory, optionally under a forced name
    pub fn extract(&self, device: &str, output_dir: &Path, name: Option<&str>) -> DeviceCommand {
        let cmd = DeviceCommand::new(&self.extractor_binary, format!("Extraction from {}", device))
            .arg("--mirror")
            .option("input", device)
            .option("output", output_dir.display());

        match name {
            Some(name) => cmd.option("name", name),
            None => cmd,
        }
    }
}
