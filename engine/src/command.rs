//! Command synthesis.
//!
//! Every function here is pure: it turns a job (plus its resolved direction)
//! into argument vectors for ssh, scp, tar and rsync. Arguments stay discrete
//! all the way to the process launcher. The two places where a tool insists
//! on a single command string are quoted for whoever splits them: the remote
//! command handed to ssh goes through [`shell_quote`], the `RSYNC_RSH`
//! override through [`rsync_rsh_quote`].

use crate::direction::{Direction, ResolvedPaths};
use crate::model::{ArchiveJob, MirrorJob, ServerProfile};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SSH: &str = "ssh";
pub const SCP: &str = "scp";
pub const TAR: &str = "tar";
pub const RSYNC: &str = "rsync";

/// Environment variable rsync reads its remote shell from.
pub const REMOTE_SHELL_ENV: &str = "RSYNC_RSH";

/// Extension of every archive produced by a job.
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Scratch directory that holds archives between compress and copy.
pub const ARCHIVE_SCRATCH_DIR: &str = "/tmp";

/// Archive target used for dry runs; nothing is written.
pub const DISCARD_SINK: &str = "/dev/null";

/// rsync `--out-format` producing one `<bytes>###<name>` record per file.
pub const PROGRESS_FORMAT_ARG: &str = "--out-format=%l###%n";

/// A program plus its arguments and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Added to the inherited environment, never replacing it
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Invocation {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The whole invocation as one shell-safe string.
    pub fn to_shell_string(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell_string())
    }
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c)
}

/// Quote one word for a POSIX shell.
///
/// Words made only of safe characters pass through unchanged. Anything else
/// is wrapped in single quotes, with embedded single quotes written as `'\''`.
pub fn shell_quote(word: &str) -> String {
    if !word.is_empty() && word.chars().all(is_shell_safe) {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// One `--exclude=PATTERN` token per pattern.
pub fn exclude_args(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .map(|pattern| format!("--exclude={}", pattern))
        .collect()
}

/// Where the archive for `job` is written.
///
/// Dry runs archive into the discard sink. Otherwise the archive lands in
/// the scratch directory as `<filename>_<timestamp>.tar.gz`.
pub fn archive_target(job: &ArchiveJob, timestamp: i64) -> PathBuf {
    if job.dry_run {
        return PathBuf::from(DISCARD_SINK);
    }
    Path::new(ARCHIVE_SCRATCH_DIR).join(format!(
        "{}_{}{}",
        job.filename, timestamp, ARCHIVE_EXTENSION
    ))
}

/// Quote one word of an `RSYNC_RSH` value.
///
/// rsync splits that value itself rather than through a shell: backslashes
/// are literal and a quote inside single quotes is written twice.
pub fn rsync_rsh_quote(word: &str) -> String {
    if !word.is_empty() && word.chars().all(is_shell_safe) {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', "''"))
}

/// `tar --exclude=... -zcvf <target> <source>`
fn tar_invocation(exclude: &[String], target: &Path, source: &str) -> Invocation {
    Invocation::new(TAR)
        .args(exclude_args(exclude))
        .arg("-zcvf")
        .arg(target.to_string_lossy())
        .arg(source)
}

/// ssh options shared by every remote invocation: identity and port.
fn ssh_identity_args(server: &ServerProfile) -> Vec<String> {
    vec![
        "-i".to_string(),
        server.private_key.clone(),
        "-p".to_string(),
        server.port.clone(),
    ]
}

/// The compress step of an archive job.
///
/// With a remote source the tar command runs on the remote host, serialized
/// into a single quoted ssh command string. With a local source it runs here.
pub fn archive_invocation(
    job: &ArchiveJob,
    paths: &ResolvedPaths,
    server: &ServerProfile,
    target: &Path,
) -> Invocation {
    let tar = tar_invocation(&job.exclude, target, &paths.source);
    match paths.direction {
        Direction::Pull => Invocation::new(SSH)
            .args(ssh_identity_args(server))
            .arg(server.connection_string())
            .arg(tar.to_shell_string()),
        Direction::Push => tar,
    }
}

/// The copy step of an archive job: scp the archive to its destination.
pub fn copy_invocation(paths: &ResolvedPaths, server: &ServerProfile, target: &Path) -> Invocation {
    let connection = server.connection_string();
    let target = target.to_string_lossy();
    let (from, to) = match paths.direction {
        Direction::Pull => (format!("{}:{}", connection, target), paths.dest.clone()),
        Direction::Push => (target.into_owned(), format!("{}:{}", connection, paths.dest)),
    };

    Invocation::new(SCP)
        .args(["-i".to_string(), server.private_key.clone()])
        .args(["-P".to_string(), server.port.clone()])
        .arg(from)
        .arg(to)
}

/// The remote-shell override rsync uses to reach the server.
pub fn remote_shell(server: &ServerProfile) -> String {
    std::iter::once(SSH.to_string())
        .chain(ssh_identity_args(server))
        .map(|word| rsync_rsh_quote(&word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Optional rsync behaviour decided by the orchestrator rather than the job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorOptions {
    /// Emit per-file `<bytes>###<name>` records for the progress parser
    pub track_progress: bool,
    /// Append transfer statistics to the output
    pub stats: bool,
}

/// rsync arguments for a mirror job, endpoints included.
pub fn mirror_args(job: &MirrorJob, paths: &ResolvedPaths, connection: &str, options: MirrorOptions) -> Vec<String> {
    let mut args = vec!["-avz".to_string(), "--progress".to_string()];

    if options.track_progress {
        args.push(PROGRESS_FORMAT_ARG.to_string());
    }
    if job.dry_run {
        args.push("--dry-run".to_string());
    }
    if options.stats {
        args.push("--stats".to_string());
    }
    if job.delete_extraneous_from_dest {
        args.push("--delete".to_string());
    }
    args.extend(exclude_args(&job.exclude));

    let (source, dest) = paths.with_connection(connection);
    args.push(source);
    args.push(dest);
    args
}

/// The complete rsync invocation for a mirror job, remote shell included.
pub fn mirror_invocation(
    job: &MirrorJob,
    paths: &ResolvedPaths,
    server: &ServerProfile,
    options: MirrorOptions,
) -> Invocation {
    Invocation::new(RSYNC)
        .args(mirror_args(job, paths, &server.connection_string(), options))
        .env(REMOTE_SHELL_ENV, remote_shell(server))
}

/// The same rsync run in simulation mode, for estimating the work.
pub fn simulation_of(live: &Invocation) -> Invocation {
    let mut simulated = live.clone();
    if !simulated.args.iter().any(|a| a == "--dry-run") {
        simulated.args.insert(0, "--dry-run".to_string());
    }
    simulated
}

/// Bounded, non-interactive `ssh ... exit` used to check reachability.
pub fn probe_invocation(server: &ServerProfile, connect_timeout: Duration) -> Invocation {
    Invocation::new(SSH)
        .args(ssh_identity_args(server))
        .args(["-o", "BatchMode=yes"])
        .arg("-o")
        .arg(format!("ConnectTimeout={}", connect_timeout.as_secs()))
        .args(["-o", "StrictHostKeyChecking=no"])
        .args(["-o", "UserKnownHostsFile=/dev/null"])
        .arg(server.connection_string())
        .arg("exit")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::resolve;

    fn server() -> ServerProfile {
        ServerProfile {
            user: "user".to_string(),
            host: "host".to_string(),
            private_key: "/keys/id".to_string(),
            port: "2222".to_string(),
        }
    }

    fn archive_job(source: &str, dest: &str, dry_run: bool, exclude: &[&str]) -> ArchiveJob {
        ArchiveJob {
            server: "main".to_string(),
            filename: "site".to_string(),
            source: source.to_string(),
            dest: dest.to_string(),
            dry_run,
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/var/www"), "/var/www");
        assert_eq!(shell_quote("--exclude=cache"), "--exclude=cache");
        assert_eq!(shell_quote("*.log"), "'*.log'");
        assert_eq!(shell_quote("my dir"), "'my dir'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_exclude_args_count_matches_patterns() {
        assert!(exclude_args(&[]).is_empty());

        let patterns: Vec<String> = vec!["*.tmp".into(), "node_modules".into(), "a b".into()];
        let args = exclude_args(&patterns);
        assert_eq!(args.len(), patterns.len());
        assert_eq!(args[0], "--exclude=*.tmp");
        assert_eq!(args[2], "--exclude=a b");
    }

    #[test]
    fn test_archive_target_naming() {
        let job = archive_job("/srv", "remote:/bk", false, &[]);
        assert_eq!(
            archive_target(&job, 1700000000),
            PathBuf::from("/tmp/site_1700000000.tar.gz")
        );

        let dry = archive_job("/srv", "remote:/bk", true, &[]);
        assert_eq!(archive_target(&dry, 1700000000), PathBuf::from(DISCARD_SINK));
    }

    #[test]
    fn test_local_archive_runs_tar_directly() {
        let job = archive_job("/srv/site", "remote:/backups", false, &["*.log"]);
        let paths = resolve(&job.source, &job.dest);
        let target = archive_target(&job, 42);

        let tar = archive_invocation(&job, &paths, &server(), &target);
        assert_eq!(tar.program, TAR);
        assert_eq!(
            tar.args,
            vec!["--exclude=*.log", "-zcvf", "/tmp/site_42.tar.gz", "/srv/site"]
        );

        let copy = copy_invocation(&paths, &server(), &target);
        assert_eq!(copy.program, SCP);
        assert_eq!(
            copy.args,
            vec!["-i", "/keys/id", "-P", "2222", "/tmp/site_42.tar.gz", "user@host:/backups"]
        );
    }

    #[test]
    fn test_remote_archive_is_wrapped_in_ssh() {
        let job = archive_job("remote:/var/www", "/local/backups", false, &["*.log"]);
        let paths = resolve(&job.source, &job.dest);
        let target = archive_target(&job, 42);

        let compress = archive_invocation(&job, &paths, &server(), &target);
        assert_eq!(compress.program, SSH);
        assert_eq!(
            compress.args,
            vec![
                "-i",
                "/keys/id",
                "-p",
                "2222",
                "user@host",
                "tar '--exclude=*.log' -zcvf /tmp/site_42.tar.gz /var/www",
            ]
        );

        let copy = copy_invocation(&paths, &server(), &target);
        assert_eq!(
            copy.args,
            vec!["-i", "/keys/id", "-P", "2222", "user@host:/tmp/site_42.tar.gz", "/local/backups"]
        );
    }

    #[test]
    fn test_mirror_args_pull() {
        let job = MirrorJob {
            server: "main".to_string(),
            source: "remote:/data".to_string(),
            dest: "/backup".to_string(),
            exclude: vec!["*.iso".to_string()],
            ..Default::default()
        };
        let paths = resolve(&job.source, &job.dest);
        let options = MirrorOptions {
            track_progress: true,
            stats: false,
        };

        let args = mirror_args(&job, &paths, "user@host", options);
        assert_eq!(
            args,
            vec![
                "-avz",
                "--progress",
                PROGRESS_FORMAT_ARG,
                "--exclude=*.iso",
                "user@host:/data",
                "/backup",
            ]
        );
    }

    #[test]
    fn test_mirror_args_optional_flags() {
        let job = MirrorJob {
            server: "main".to_string(),
            source: "/home".to_string(),
            dest: "remote:/srv/home".to_string(),
            dry_run: true,
            delete_extraneous_from_dest: true,
            ..Default::default()
        };
        let paths = resolve(&job.source, &job.dest);
        let options = MirrorOptions {
            track_progress: false,
            stats: true,
        };

        let args = mirror_args(&job, &paths, "user@host", options);
        assert_eq!(
            args,
            vec!["-avz", "--progress", "--dry-run", "--stats", "--delete", "/home", "user@host:/srv/home"]
        );
        assert!(!args.iter().any(|a| a == PROGRESS_FORMAT_ARG));
    }

    #[test]
    fn test_mirror_invocation_sets_remote_shell() {
        let job = MirrorJob {
            server: "main".to_string(),
            source: "/a".to_string(),
            dest: "remote:/b".to_string(),
            ..Default::default()
        };
        let mut profile = server();
        profile.private_key = "/keys/my key".to_string();
        let paths = resolve(&job.source, &job.dest);

        let invocation = mirror_invocation(&job, &paths, &profile, MirrorOptions::default());
        assert_eq!(invocation.program, RSYNC);
        assert_eq!(
            invocation.env,
            vec![(REMOTE_SHELL_ENV.to_string(), "ssh -i '/keys/my key' -p 2222".to_string())]
        );
    }

    #[test]
    fn test_remote_shell_doubles_embedded_quotes() {
        let mut profile = server();
        profile.private_key = "/home/o'brien/.ssh/id".to_string();

        let value = remote_shell(&profile);
        assert_eq!(value, "ssh -i '/home/o''brien/.ssh/id' -p 2222");
        assert!(!value.contains('\\'));
    }

    #[test]
    fn test_rsync_rsh_quote_leaves_plain_words_alone() {
        assert_eq!(rsync_rsh_quote("/keys/id_ed25519"), "/keys/id_ed25519");
        assert_eq!(rsync_rsh_quote(""), "''");
        assert_eq!(rsync_rsh_quote("it's"), "'it''s'");
    }

    #[test]
    fn test_simulation_prepends_dry_run_once() {
        let live = Invocation::new(RSYNC).args(["-avz", "/a", "/b"]);
        let simulated = simulation_of(&live);
        assert_eq!(simulated.args, vec!["--dry-run", "-avz", "/a", "/b"]);
        assert_eq!(simulation_of(&simulated).args, simulated.args);
    }

    #[test]
    fn test_probe_invocation_is_non_interactive() {
        let probe = probe_invocation(&server(), Duration::from_secs(5));
        assert_eq!(probe.program, SSH);
        assert!(probe.args.contains(&"BatchMode=yes".to_string()));
        assert!(probe.args.contains(&"ConnectTimeout=5".to_string()));
        assert!(probe.args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert_eq!(probe.args.last().map(String::as_str), Some("exit"));
        assert_eq!(probe.args[probe.args.len() - 2], "user@host");
    }

    #[test]
    fn test_invocation_display_quotes_arguments() {
        let invocation = Invocation::new(TAR).args(["-zcvf", "/tmp/a b.tar.gz", "/src"]);
        assert_eq!(invocation.to_string(), "tar -zcvf '/tmp/a b.tar.gz' /src");
    }
}
