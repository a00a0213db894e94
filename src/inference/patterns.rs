//! Capability-indicating Python constructs and import alias resolution.
//!
//! Matching is by qualified name. `os.environ.get` matches the `os.environ`
//! entry; entries ending in `*` match any name with that prefix
//! (`os.exec*` covers `os.execv`, `os.execlp`, ...).

use std::collections::HashMap;

use crate::ir::Capability;

/// Importing any of these modules (or a submodule) is enough to flag the
/// capability.
const MODULES: &[(&str, Capability)] = &[
    // Network
    ("socket", Capability::Network),
    ("ssl", Capability::Network),
    ("http.client", Capability::Network),
    ("http.server", Capability::Network),
    ("urllib.request", Capability::Network),
    ("urllib2", Capability::Network),
    ("urllib3", Capability::Network),
    ("requests", Capability::Network),
    ("httpx", Capability::Network),
    ("httplib2", Capability::Network),
    ("aiohttp", Capability::Network),
    ("ftplib", Capability::Network),
    ("smtplib", Capability::Network),
    ("poplib", Capability::Network),
    ("imaplib", Capability::Network),
    ("nntplib", Capability::Network),
    ("telnetlib", Capability::Network),
    ("xmlrpc", Capability::Network),
    ("socketserver", Capability::Network),
    ("asyncore", Capability::Network),
    ("websocket", Capability::Network),
    ("websockets", Capability::Network),
    ("paramiko", Capability::Network),
    ("pycurl", Capability::Network),
    ("grpc", Capability::Network),
    ("zmq", Capability::Network),
    ("boto3", Capability::Network),
    ("botocore", Capability::Network),
    // Filesystem
    ("shutil", Capability::Filesystem),
    ("tempfile", Capability::Filesystem),
    ("pathlib", Capability::Filesystem),
    ("glob", Capability::Filesystem),
    ("fileinput", Capability::Filesystem),
    ("filecmp", Capability::Filesystem),
    ("zipfile", Capability::Filesystem),
    ("tarfile", Capability::Filesystem),
    ("shelve", Capability::Filesystem),
    ("dbm", Capability::Filesystem),
    ("sqlite3", Capability::Filesystem),
    ("mmap", Capability::Filesystem),
    ("aiofiles", Capability::Filesystem),
    // Subprocess
    ("subprocess", Capability::Subprocess),
    ("multiprocessing", Capability::Subprocess),
    ("pty", Capability::Subprocess),
    ("pexpect", Capability::Subprocess),
    ("sh", Capability::Subprocess),
    ("plumbum", Capability::Subprocess),
    ("asyncio.subprocess", Capability::Subprocess),
    ("webbrowser", Capability::Subprocess),
    // Environment
    ("dotenv", Capability::Environment),
    ("environs", Capability::Environment),
    ("decouple", Capability::Environment),
    // Dynamic code execution
    ("importlib", Capability::DynamicCodeExecution),
    ("runpy", Capability::DynamicCodeExecution),
    ("code", Capability::DynamicCodeExecution),
    ("codeop", Capability::DynamicCodeExecution),
    ("imp", Capability::DynamicCodeExecution),
    ("pickle", Capability::DynamicCodeExecution),
    ("cPickle", Capability::DynamicCodeExecution),
    ("dill", Capability::DynamicCodeExecution),
    // Native extensions
    ("ctypes", Capability::NativeExtension),
    ("_ctypes", Capability::NativeExtension),
    ("cffi", Capability::NativeExtension),
];

/// Qualified functions and attributes of otherwise broad modules (`os`,
/// `io`, `asyncio`) that pin down a capability.
const QUALIFIED: &[(&str, Capability)] = &[
    // Subprocess
    ("os.system", Capability::Subprocess),
    ("os.popen", Capability::Subprocess),
    ("os.exec*", Capability::Subprocess),
    ("os.spawn*", Capability::Subprocess),
    ("os.posix_spawn*", Capability::Subprocess),
    ("os.fork", Capability::Subprocess),
    ("os.forkpty", Capability::Subprocess),
    ("os.startfile", Capability::Subprocess),
    ("os.kill", Capability::Subprocess),
    ("os.killpg", Capability::Subprocess),
    ("asyncio.create_subprocess_exec", Capability::Subprocess),
    ("asyncio.create_subprocess_shell", Capability::Subprocess),
    ("concurrent.futures.ProcessPoolExecutor", Capability::Subprocess),
    // Environment
    ("os.environ", Capability::Environment),
    ("os.environb", Capability::Environment),
    ("os.getenv", Capability::Environment),
    ("os.getenvb", Capability::Environment),
    ("os.putenv", Capability::Environment),
    ("os.unsetenv", Capability::Environment),
    // Filesystem
    ("os.open", Capability::Filesystem),
    ("os.remove", Capability::Filesystem),
    ("os.unlink", Capability::Filesystem),
    ("os.rmdir", Capability::Filesystem),
    ("os.removedirs", Capability::Filesystem),
    ("os.mkdir", Capability::Filesystem),
    ("os.makedirs", Capability::Filesystem),
    ("os.rename", Capability::Filesystem),
    ("os.renames", Capability::Filesystem),
    ("os.replace", Capability::Filesystem),
    ("os.listdir", Capability::Filesystem),
    ("os.scandir", Capability::Filesystem),
    ("os.walk", Capability::Filesystem),
    ("os.chmod", Capability::Filesystem),
    ("os.chown", Capability::Filesystem),
    ("os.link", Capability::Filesystem),
    ("os.symlink", Capability::Filesystem),
    ("os.truncate", Capability::Filesystem),
    ("os.utime", Capability::Filesystem),
    ("os.stat", Capability::Filesystem),
    ("os.lstat", Capability::Filesystem),
    ("os.statvfs", Capability::Filesystem),
    ("os.access", Capability::Filesystem),
    ("os.readlink", Capability::Filesystem),
    ("os.fdopen", Capability::Filesystem),
    ("os.mkfifo", Capability::Filesystem),
    ("os.mknod", Capability::Filesystem),
    ("os.chdir", Capability::Filesystem),
    ("os.chroot", Capability::Filesystem),
    ("os.lchown", Capability::Filesystem),
    ("os.lchmod", Capability::Filesystem),
    ("os.path.exists", Capability::Filesystem),
    ("os.path.lexists", Capability::Filesystem),
    ("os.path.isfile", Capability::Filesystem),
    ("os.path.isdir", Capability::Filesystem),
    ("os.path.islink", Capability::Filesystem),
    ("os.path.ismount", Capability::Filesystem),
    ("os.path.samefile", Capability::Filesystem),
    ("os.path.realpath", Capability::Filesystem),
    ("os.path.get*", Capability::Filesystem),
    ("io.open", Capability::Filesystem),
    ("io.FileIO", Capability::Filesystem),
    ("codecs.open", Capability::Filesystem),
    // Network
    ("asyncio.open_connection", Capability::Network),
    ("asyncio.open_unix_connection", Capability::Network),
    ("asyncio.start_server", Capability::Network),
    ("asyncio.start_unix_server", Capability::Network),
    // Dynamic code execution
    ("builtins.eval", Capability::DynamicCodeExecution),
    ("builtins.exec", Capability::DynamicCodeExecution),
    ("builtins.compile", Capability::DynamicCodeExecution),
    ("builtins.__import__", Capability::DynamicCodeExecution),
    ("builtins.open", Capability::Filesystem),
];

/// Builtins flagged wherever they are referenced unshadowed, called or not
/// (`f = eval`, `map(open, names)`).
const BUILTINS: &[(&str, Capability)] = &[
    ("open", Capability::Filesystem),
    ("eval", Capability::DynamicCodeExecution),
    ("exec", Capability::DynamicCodeExecution),
    ("compile", Capability::DynamicCodeExecution),
    ("__import__", Capability::DynamicCodeExecution),
];

/// Builtins that fetch an attribute of their first argument by name.
const LOOKUP_BUILTINS: &[&str] = &["getattr", "vars"];

fn matches(name: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => {
            name == pattern
                || name
                    .strip_prefix(pattern)
                    .is_some_and(|rest| rest.starts_with('.'))
        }
    }
}

/// Capability flagged by importing `module`, if any.
pub fn module_capability(module: &str) -> Option<Capability> {
    MODULES
        .iter()
        .find(|(pattern, _)| matches(module, pattern))
        .map(|&(_, cap)| cap)
}

/// Capability flagged by a qualified function or attribute (`os.system`).
pub fn qualified_entry(name: &str) -> Option<Capability> {
    QUALIFIED
        .iter()
        .find(|(pattern, _)| matches(name, pattern))
        .map(|&(_, cap)| cap)
}

/// Capability flagged by referencing the qualified name, checking both the
/// function/attribute table and the module table (`urllib.request.urlopen`
/// reached through `import urllib`).
pub fn qualified_capability(name: &str) -> Option<Capability> {
    qualified_entry(name).or_else(|| module_capability(name))
}

/// Whether `name` is a builtin that looks up attributes dynamically.
pub fn is_lookup_builtin(name: &str) -> bool {
    LOOKUP_BUILTINS.contains(&name)
}

/// Everything reachable through a name lookup on `module` that cannot be
/// resolved statically (`getattr(os, name)`, `vars(os)`, `os.__dict__`).
///
/// Modules with no capability-bearing members yield nothing; anything else
/// yields every capability its members carry plus dynamic code execution.
pub fn lookup_capabilities(module: &str) -> Vec<Capability> {
    let prefix = format!("{module}.");
    let mut caps: Vec<Capability> = QUALIFIED
        .iter()
        .chain(MODULES.iter())
        .filter(|(pattern, _)| pattern.starts_with(&prefix))
        .map(|&(_, cap)| cap)
        .chain(module_capability(module))
        .collect();
    if caps.is_empty() {
        return caps;
    }
    caps.push(Capability::DynamicCodeExecution);
    caps.sort();
    caps.dedup();
    caps
}

/// Capability flagged by referencing an unqualified builtin.
pub fn builtin_capability(name: &str) -> Option<Capability> {
    BUILTINS
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|&(_, cap)| cap)
}

/// Local names bound by import statements, mapped to what they refer to.
#[derive(Debug, Default)]
pub struct ImportTable {
    bindings: HashMap<String, String>,
    /// Modules pulled in with `from m import *`.
    wildcards: Vec<String>,
}

impl ImportTable {
    /// `import a.b.c` binds `a`; `import a.b as x` binds `x` to `a.b`.
    pub fn bind_import(&mut self, module: &str, alias: Option<&str>) {
        match alias {
            Some(alias) => {
                self.bindings.insert(alias.to_string(), module.to_string());
            }
            None => {
                let root = module.split('.').next().unwrap_or(module);
                self.bindings.insert(root.to_string(), root.to_string());
            }
        }
    }

    /// `from m import n as x` binds `x` (or `n`) to `m.n`.
    pub fn bind_from(&mut self, module: &str, name: &str, alias: Option<&str>) {
        let local = alias.unwrap_or(name);
        self.bindings
            .insert(local.to_string(), format!("{module}.{name}"));
    }

    pub fn bind_wildcard(&mut self, module: &str) {
        self.wildcards.push(module.to_string());
    }

    pub fn is_bound(&self, local: &str) -> bool {
        self.bindings.contains_key(local)
    }

    /// Expand the first segment of a dotted reference through the bindings.
    /// Unbound roots are returned unchanged.
    pub fn resolve(&self, dotted: &str) -> String {
        let (root, rest) = match dotted.split_once('.') {
            Some((root, rest)) => (root, Some(rest)),
            None => (dotted, None),
        };
        match (self.bindings.get(root), rest) {
            (Some(target), Some(rest)) => format!("{target}.{rest}"),
            (Some(target), None) => target.clone(),
            (None, _) => dotted.to_string(),
        }
    }

    /// Capability used by a dotted reference whose root is an imported name.
    ///
    /// Module-table hits are skipped when the binding's own import already
    /// flagged them, so `import requests` followed by `requests.get` yields
    /// one indicator, not one per call.
    pub fn use_site_capability(&self, dotted: &str) -> Option<(String, Capability)> {
        let root = dotted.split('.').next()?;
        let target = self.bindings.get(root)?;
        let resolved = self.resolve(dotted);
        if let Some(cap) = qualified_entry(&resolved) {
            return Some((resolved, cap));
        }
        if module_capability(target).is_some() {
            return None;
        }
        module_capability(&resolved).map(|cap| (resolved, cap))
    }

    /// Candidate qualified names for a bare identifier: its binding, or the
    /// identifier looked up in every wildcard-imported module.
    pub fn wildcard_candidates(&self, ident: &str) -> Vec<String> {
        self.wildcards
            .iter()
            .map(|m| format!("{m}.{ident}"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submodules_match_parent_entries() {
        assert_eq!(
            module_capability("requests.adapters"),
            Some(Capability::Network)
        );
        assert_eq!(module_capability("requestsx"), None);
        assert_eq!(module_capability("urllib.parse"), None);
        assert_eq!(
            module_capability("urllib.request"),
            Some(Capability::Network)
        );
    }

    #[test]
    fn prefix_patterns_cover_families() {
        assert_eq!(
            qualified_capability("os.execvpe"),
            Some(Capability::Subprocess)
        );
        assert_eq!(
            qualified_capability("os.spawnlp"),
            Some(Capability::Subprocess)
        );
        assert_eq!(
            qualified_capability("os.environ.get"),
            Some(Capability::Environment)
        );
        assert_eq!(
            qualified_capability("os.path.getmtime"),
            Some(Capability::Filesystem)
        );
        assert_eq!(
            qualified_capability("os.path.getctime"),
            Some(Capability::Filesystem)
        );
        for name in ["os.path.islink", "os.path.lexists", "os.access", "os.lstat"] {
            assert_eq!(qualified_capability(name), Some(Capability::Filesystem), "{name}");
        }
        for name in ["os.readlink", "os.fdopen", "os.mkfifo"] {
            assert_eq!(qualified_capability(name), Some(Capability::Filesystem), "{name}");
        }
        assert_eq!(qualified_capability("os.kill"), Some(Capability::Subprocess));
        assert_eq!(qualified_capability("os.killpg"), Some(Capability::Subprocess));
        assert_eq!(
            module_capability("asyncio.subprocess"),
            Some(Capability::Subprocess)
        );
        assert_eq!(module_capability("webbrowser"), Some(Capability::Subprocess));
        assert_eq!(module_capability("asyncio"), None);
        assert_eq!(qualified_capability("os.path.join"), None);
        assert_eq!(qualified_capability("os.getcwd"), None);
    }

    #[test]
    fn aliases_resolve() {
        let mut table = ImportTable::default();
        table.bind_import("subprocess", Some("sp"));
        table.bind_import("os.path", None);
        table.bind_from("os", "system", Some("run_shell"));

        assert_eq!(table.resolve("sp.run"), "subprocess.run");
        assert_eq!(table.resolve("os.path.exists"), "os.path.exists");
        assert_eq!(table.resolve("run_shell"), "os.system");
        assert_eq!(table.resolve("json.dumps"), "json.dumps");
    }

    #[test]
    fn use_sites_skip_already_flagged_modules() {
        let mut table = ImportTable::default();
        table.bind_import("requests", None);
        table.bind_import("urllib", None);
        table.bind_import("os", None);

        assert_eq!(table.use_site_capability("requests.get"), None);
        assert_eq!(
            table.use_site_capability("urllib.request.urlopen"),
            Some(("urllib.request.urlopen".into(), Capability::Network))
        );
        assert_eq!(
            table.use_site_capability("os.environ.get"),
            Some(("os.environ.get".into(), Capability::Environment))
        );
        assert_eq!(table.use_site_capability("socket.socket"), None);
    }

    #[test]
    fn unresolved_lookups_cover_module_members() {
        assert_eq!(
            lookup_capabilities("os"),
            vec![
                Capability::Filesystem,
                Capability::Subprocess,
                Capability::Environment,
                Capability::DynamicCodeExecution,
            ]
        );
        assert_eq!(
            lookup_capabilities("builtins"),
            vec![Capability::Filesystem, Capability::DynamicCodeExecution]
        );
        assert_eq!(
            lookup_capabilities("subprocess"),
            vec![Capability::Subprocess, Capability::DynamicCodeExecution]
        );
        assert!(lookup_capabilities("json").is_empty());
        assert!(is_lookup_builtin("getattr"));
        assert!(!is_lookup_builtin("setattr"));
    }

    #[test]
    fn builtins_are_exact() {
        assert_eq!(builtin_capability("open"), Some(Capability::Filesystem));
        assert_eq!(builtin_capability("opener"), None);
    }
}
