//! Command safety classification
//!
//! Maps a raw shell command line to a conservative verdict used to gate
//! auto-execution. Classification is pure and fails closed: anything not
//! recognised by a rule is unsafe with category [`SafetyCategory::Unknown`].

use serde::{Deserialize, Serialize};

/// Bucket a classified command falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyCategory {
    /// System inspection (processes, users, services)
    System,
    /// Read-only file inspection
    File,
    /// Network diagnostics
    Network,
    /// Mutates state or escapes the sandboxed read-only set
    Dangerous,
    /// Not recognised by any rule
    Unknown,
}

impl std::fmt::Display for SafetyCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::File => write!(f, "file"),
            Self::Network => write!(f, "network"),
            Self::Dangerous => write!(f, "dangerous"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of classifying one command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    /// Command name with any directory prefix removed
    pub base_command: String,
    /// Remaining whitespace-separated tokens of the first pipeline stage
    pub arguments: Vec<String>,
    /// Whether the command may run without confirmation
    pub is_safe: bool,
    /// Classification bucket
    pub category: SafetyCategory,
}

impl SafetyVerdict {
    fn new(base_command: &str, arguments: &[String], is_safe: bool, category: SafetyCategory) -> Self {
        Self {
            base_command: base_command.to_string(),
            arguments: arguments.to_vec(),
            is_safe,
            category,
        }
    }
}

const FILE_COMMANDS: &[&str] = &[
    "ls", "cat", "head", "tail", "grep", "find", "wc", "du", "stat", "file",
];

const NETWORK_COMMANDS: &[&str] = &[
    "ping", "traceroute", "nslookup", "dig", "netstat", "ss", "ip", "ifconfig",
];

const SYSTEM_COMMANDS: &[&str] = &[
    "ps", "df", "free", "uptime", "whoami", "pwd", "hostname", "uname", "id", "groups", "date",
    "env", "top", "htop", "w", "who", "readlink", "basename", "dirname", "pgrep", "pidof", "lsof",
    "which", "type", "man", "history", "jobs", "echo", "seq", "sleep", "test", "true", "false",
    "printf",
];

const DANGEROUS_COMMANDS: &[&str] = &[
    // file modification
    "rm", "mv", "cp", "touch", "mkdir", "rmdir", "chmod", "chown", "chgrp", "ln", "split",
    "csplit", "tee", "truncate", "shred",
    // disks
    "dd", "mkfs", "fdisk", "parted", "mount", "umount",
    // power and init
    "reboot", "shutdown", "poweroff", "halt", "init",
    // package managers
    "apt", "apt-get", "yum", "dnf", "pacman", "pip", "npm", "yarn",
    // network clients
    "curl", "wget", "nc", "netcat", "ssh", "scp", "rsync",
    // editors
    "vi", "vim", "nano", "ed",
    // archives
    "tar", "zip", "unzip", "gzip", "gunzip", "xz", "unxz",
    // databases
    "mysql", "psql", "mongosh", "redis-cli",
    // privilege, job control and firewalls
    "kill", "killall", "pkill", "su", "sudo", "nohup", "screen", "tmux", "iptables", "ufw",
    "firewall-cmd",
];

const DOCKER_INSPECT: &[&str] = &[
    "ps", "images", "inspect", "logs", "stats", "info", "version", "top", "port", "diff",
    "events", "history",
];

const DOCKER_MUTATE: &[&str] = &[
    "rm", "rmi", "stop", "kill", "exec", "run", "restart", "save", "load", "commit",
];

const SYSTEMCTL_INSPECT: &[&str] = &[
    "status", "is-active", "is-enabled", "is-failed", "show", "list-units", "list-timers",
    "list-jobs",
];

const SYSTEMCTL_MUTATE: &[&str] = &[
    "start", "stop", "restart", "reload", "enable", "disable", "mask", "unmask", "daemon-reload",
];

const FIND_ACTIONS: &[&str] = &["-delete", "-exec", "-execdir", "-ok", "-okdir", "-fprint"];

/// Tokens that start a second command; everything after them is unclassified
const CHAIN_MARKERS: &[&str] = &[";", "&&", "||", "`", "$(", "<(", ">(", "\n"];

/// Splits a command line into its base command and arguments
///
/// Strips a leading `sudo`, keeps only the first pipeline stage, drops any
/// redirection, and removes a directory prefix from the command name.
/// Returns an empty base command for blank input.
#[must_use]
pub fn parse_command(input: &str) -> (String, Vec<String>) {
    let mut line = input.trim();

    if let Some(rest) = line.strip_prefix("sudo") {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            line = rest.trim_start();
        }
    }

    if let Some(idx) = line.find('|') {
        line = &line[..idx];
    }
    if let Some(idx) = line.find(['>', '<']) {
        line = &line[..idx];
    }

    let mut tokens = line.split_whitespace();
    let Some(first) = tokens.next() else {
        return (String::new(), Vec::new());
    };

    let base = first.rsplit('/').next().unwrap_or(first).to_string();
    let args = tokens.map(str::to_string).collect();
    (base, args)
}

fn contains(list: &[&str], item: &str) -> bool {
    list.contains(&item)
}

/// Returns true when the line chains a second command the parser would skip
fn has_command_chaining(input: &str) -> bool {
    let input = input.trim();
    CHAIN_MARKERS.iter().any(|marker| input.contains(marker)) || has_background_separator(input)
}

/// A lone `&` backgrounds the first command and starts another
///
/// `&&` is covered by the markers; `>&`, `<&` and `&>` are redirections.
fn has_background_separator(input: &str) -> bool {
    let bytes = input.as_bytes();
    bytes.iter().enumerate().any(|(idx, &b)| {
        if b != b'&' {
            return false;
        }
        let prev = idx.checked_sub(1).map(|i| bytes[i]);
        let next = bytes.get(idx + 1).copied();
        !matches!(prev, Some(b'&' | b'>' | b'<')) && !matches!(next, Some(b'&' | b'>'))
    })
}

/// Returns true when output is redirected anywhere other than `/dev/null`
/// or another file descriptor
fn has_file_redirect(input: &str) -> bool {
    let mut rest = input;
    while let Some(idx) = rest.find('>') {
        let after = rest[idx + 1..].trim_start_matches('>').trim_start();
        let target = after.split_whitespace().next().unwrap_or("");
        if target.is_empty() || !(target == "/dev/null" || is_fd_target(target)) {
            return true;
        }
        rest = &rest[idx + 1..];
    }
    false
}

/// `&1`, `&2`, `&-`; a bare `&` means the next word is a file
fn is_fd_target(target: &str) -> bool {
    target.strip_prefix('&').is_some_and(|fd| {
        !fd.is_empty() && (fd == "-" || fd.bytes().all(|b| b.is_ascii_digit()))
    })
}

fn categorize(command: &str) -> SafetyCategory {
    if contains(FILE_COMMANDS, command) {
        SafetyCategory::File
    } else if contains(NETWORK_COMMANDS, command) {
        SafetyCategory::Network
    } else {
        SafetyCategory::System
    }
}

fn classify_docker(args: &[String]) -> (bool, SafetyCategory) {
    match args.first().map(String::as_str) {
        None => (true, SafetyCategory::System),
        Some(sub) if contains(DOCKER_INSPECT, sub) => (true, SafetyCategory::System),
        Some(sub) if contains(DOCKER_MUTATE, sub) => (false, SafetyCategory::Dangerous),
        Some(_) => (false, SafetyCategory::Unknown),
    }
}

fn classify_systemctl(args: &[String]) -> (bool, SafetyCategory) {
    match args.first().map(String::as_str) {
        None => (true, SafetyCategory::System),
        Some(sub) if contains(SYSTEMCTL_INSPECT, sub) => (true, SafetyCategory::System),
        Some(sub) if contains(SYSTEMCTL_MUTATE, sub) => (false, SafetyCategory::Dangerous),
        Some(_) => (false, SafetyCategory::System),
    }
}

/// Classifies a command line
///
/// Lookup order: chaining and file redirection, subcommand rules for tools
/// whose safety depends on their first argument, the allowlist, the
/// denylist, then default-deny.
#[must_use]
pub fn classify(input: &str) -> SafetyVerdict {
    let (base, args) = parse_command(input);

    if base.is_empty() {
        return SafetyVerdict::new(&base, &args, false, SafetyCategory::Unknown);
    }

    if has_command_chaining(input) || has_file_redirect(input) {
        return SafetyVerdict::new(&base, &args, false, SafetyCategory::Dangerous);
    }

    let (is_safe, category) = match base.as_str() {
        "docker" => classify_docker(&args),
        "systemctl" => classify_systemctl(&args),
        "find" if args.iter().any(|a| contains(FIND_ACTIONS, a)) => {
            (false, SafetyCategory::Dangerous)
        }
        "kill" | "killall" | "pkill" => (false, SafetyCategory::Dangerous),
        cmd if contains(FILE_COMMANDS, cmd)
            || contains(NETWORK_COMMANDS, cmd)
            || contains(SYSTEM_COMMANDS, cmd) =>
        {
            (true, categorize(cmd))
        }
        cmd if contains(DANGEROUS_COMMANDS, cmd) => (false, SafetyCategory::Dangerous),
        _ => (false, SafetyCategory::Unknown),
    };

    SafetyVerdict::new(&base, &args, is_safe, category)
}
