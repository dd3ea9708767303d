//! Testing utilities for the tabench workspace
//!
//! A scratch [`Workspace`] laid out like a real experiment directory, and
//! [`FakeEngine`] `/bin/sh` scripts that follow the engine's output
//! conventions: one fresh `JSE<max+1>` directory per invocation, a `cache`
//! blob under `--writecache`, and `branch: <n>` coverage lines on stdout.

#![allow(missing_docs)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const BASE_PROGRAM: &str = "\
let sym0 = 0;
let sym1 = 1;
if (sym0 > 3) {
  sym0++;
  if (sym1 < 2) {
    sym1 = sym0;
  }
} else {
  sym0--;
}
console.log(sym0);
";

pub const MODIFIED_PROGRAM: &str = "\
let sym0 = 0;
let sym1 = 1;
if (sym0 > 3) {
  sym0++;
  if (sym1 < 2) {
    sym1 = sym0 + 1;
  }
} else {
  sym0--;
}
console.log(sym0);
";

pub const FUZZ_HARNESS: &str = "module.exports.fuzz = function (data) {};\n";

pub fn stats_json(branch_count: u64) -> String {
    serde_json::json!({
        "NUM_BRANCHES": branch_count,
        "AVE_AST_DEPTH": 2.5,
        "AVE_BRANCH_LENGTH": 3.0,
        "AVE_CONDITIONALS_PER_BRANCH": 0.5,
        "NUM_SYMBOLIC_VARS": 2,
    })
    .to_string()
}

/// Scratch experiment directory, removed on drop
#[derive(Debug)]
pub struct Workspace {
    root: TempDir,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("randjs")).unwrap();
        Self { root }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn corpus_dir(&self) -> PathBuf {
        self.root().join("randjs")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root().join("results")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root().join("experiments")
    }

    pub fn calls_path(&self) -> PathBuf {
        self.root().join("calls.log")
    }

    /// Base program, modified variant, fuzz harness and stats for `id`
    pub fn add_program(&self, id: u32, branch_count: u64) {
        self.write_corpus_file(&format!("{id}.jse.js"), BASE_PROGRAM);
        self.write_corpus_file(&format!("{id}.jse.diff.js"), MODIFIED_PROGRAM);
        self.write_corpus_file(&format!("{id}.jazzer.js"), FUZZ_HARNESS);
        self.write_corpus_file(&format!("{id}.stats.json"), &stats_json(branch_count));
    }

    pub fn write_corpus_file(&self, name: &str, contents: &str) {
        std::fs::write(self.corpus_dir().join(name), contents).unwrap();
    }

    pub fn remove_corpus_file(&self, name: &str) {
        std::fs::remove_file(self.corpus_dir().join(name)).unwrap();
    }

    /// Write `engine` as script `name` and return its argv prefix
    pub fn install(&self, name: &str, engine: &FakeEngine) -> Vec<String> {
        let path = self.root().join(name);
        std::fs::write(&path, engine.script(&self.results_dir(), &self.calls_path())).unwrap();
        vec!["/bin/sh".to_string(), path.display().to_string()]
    }

    /// Argument lines of every fake engine invocation so far
    pub fn engine_calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.calls_path())
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Scripted stand-in for the symbolic engine and the fuzzer
#[derive(Debug, Clone)]
pub struct FakeEngine {
    label: String,
    hang_on: Vec<String>,
    fail_on: Vec<String>,
    branches: u64,
    cache_state: String,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            label: "JSE".to_string(),
            hang_on: Vec::new(),
            fail_on: Vec::new(),
            branches: 1,
            cache_state: "{\"states\":[]}".to_string(),
        }
    }

    /// Sleep past any ceiling when an argument ends in `/<file_name>`
    #[must_use]
    pub fn hang_on(mut self, file_name: &str) -> Self {
        self.hang_on.push(format!("*/{file_name}"));
        self
    }

    /// Exit with code 3 when an argument ends in `/<file_name>`
    #[must_use]
    pub fn fail_on(mut self, file_name: &str) -> Self {
        self.fail_on.push(format!("*/{file_name}"));
        self
    }

    /// Largest `branch:` value printed
    #[must_use]
    pub fn branches(mut self, n: u64) -> Self {
        self.branches = n;
        self
    }

    #[must_use]
    pub fn cache_state(mut self, state: &str) -> Self {
        self.cache_state = state.to_string();
        self
    }

    fn script(&self, results: &Path, calls: &Path) -> String {
        let label = &self.label;
        let mut s = String::from("#!/bin/sh\n");
        let _ = writeln!(s, "results='{}'", results.display());
        let _ = writeln!(s, "echo \"$*\" >> '{}'", calls.display());
        s.push_str("write=0\nfuzz=0\nfor arg in \"$@\"; do\n");
        s.push_str("  case \"$arg\" in --writecache) write=1 ;; -max_total_time=*) fuzz=1 ;; esac\ndone\n");
        s.push_str("max=0\nmkdir -p \"$results\"\n");
        let _ = writeln!(s, "for d in \"$results\"/{label}*; do");
        s.push_str("  [ -d \"$d\" ] || continue\n");
        let _ = writeln!(s, "  n=${{d##*/{label}}}");
        s.push_str("  case \"$n\" in ''|*[!0-9]*) continue ;; esac\n");
        s.push_str("  if [ \"$n\" -gt \"$max\" ]; then max=$n; fi\ndone\n");
        let _ = writeln!(s, "out=\"$results/{label}$((max + 1))\"");
        // Like the engine: a directory claimed by a concurrent run is fatal.
        s.push_str("if [ $fuzz = 0 ]; then mkdir \"$out\" || exit 70; fi\n");

        s.push_str("for arg in \"$@\"; do\n  case \"$arg\" in\n");
        if !self.hang_on.is_empty() {
            let _ = writeln!(
                s,
                "    {}) [ $write = 1 ] && printf partial > \"$out/cache\"; exec sleep 30 ;;",
                self.hang_on.join("|")
            );
        }
        if !self.fail_on.is_empty() {
            let _ = writeln!(
                s,
                "    {}) echo \"engine failure on $arg\" >&2; exit 3 ;;",
                self.fail_on.join("|")
            );
        }
        s.push_str("  esac\ndone\n");

        let _ = writeln!(s, "[ $write = 1 ] && printf '%s' '{}' > \"$out/cache\"", self.cache_state);
        s.push_str("echo \"branch: 1\"\n");
        let _ = writeln!(s, "echo \"branch: {}\"", self.branches);
        s.push_str("exit 0\n");
        s
    }
}
