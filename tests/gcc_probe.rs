//! `GccProbe` against shell scripts standing in for the compiler.

#![cfg(unix)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use tsuki_discover::{CompilerConfig, DiscoverError, GccProbe, IncludeDiscovery, LibraryIndex, MissingHeader, Probe};

struct Fixture {
    tmp:    TempDir,
    sketch: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        Self::in_dir(TempDir::new().unwrap())
    }

    /// Fixture inside the working directory, so it can be named relatively.
    fn in_working_dir() -> Self {
        Self::in_dir(TempDir::new_in(std::env::current_dir().unwrap()).unwrap())
    }

    fn in_dir(tmp: TempDir) -> Self {
        let sketch = tmp.path().join("build/sketch/sketch.ino.cpp");
        fs::create_dir_all(sketch.parent().unwrap()).unwrap();
        fs::write(&sketch, "#include \"Servo.h\"\n").unwrap();
        Fixture { tmp, sketch }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.tmp.path().join(rel)
    }

    fn relative(&self, rel: &str) -> PathBuf {
        let cwd = std::env::current_dir().unwrap();
        self.path(rel).strip_prefix(&cwd).unwrap().to_path_buf()
    }

    fn args_file(&self) -> PathBuf {
        self.path("args.txt")
    }

    /// A fake compiler run through `/bin/sh`. The script records its
    /// arguments one per line, then runs `body` with `$last` set to the
    /// final argument (the sketch).
    fn compiler(&self, body: &str) -> CompilerConfig {
        let script = self.path("fake-gcc.sh");
        let text = String::new()
            + "printf '%s\\n' \"$@\" > '" + &self.args_file().display().to_string() + "'\n"
            + "for a in \"$@\"; do last=\"$a\"; done\n"
            + body
            + "\n";
        fs::write(&script, text).unwrap();
        CompilerConfig {
            path:  PathBuf::from("/bin/sh"),
            flags: vec![script.display().to_string()],
        }
    }

    fn recorded_args(&self) -> Vec<String> {
        fs::read_to_string(self.args_file())
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "").unwrap();
}

#[test]
fn depfile_with_missing_header() {
    let fx = Fixture::new();
    let found = fx.path("libs/A/A.h");
    touch(&found);
    let compiler = fx.compiler(&format!(
        "echo \"sketch.o: $last \\\\\"\necho \" {} B.h\"",
        found.display()
    ));

    let report = GccProbe::new(compiler, Vec::new())
        .probe(&[fx.path("libs/A")], &fx.sketch)
        .unwrap();

    assert_eq!(report.missing, vec![MissingHeader::new("B.h")]);
    assert_eq!(report.dependencies, vec![found]);
    assert!(!report.is_complete());
}

#[test]
fn arguments_carry_dependency_flags_and_folder_order() {
    let fx = Fixture::new();
    let compiler = fx.compiler("echo \"sketch.o: $last\"");
    let core = fx.path("hw/cores/arduino");
    let lib_a = fx.path("libs/A");
    let lib_b = fx.path("libs/B");

    let report = GccProbe::new(compiler, vec![core.clone()])
        .probe(&[lib_a.clone(), lib_b.clone()], &fx.sketch)
        .unwrap();
    assert!(report.is_complete());
    assert!(report.dependencies.is_empty());

    let args = fx.recorded_args();
    let includes: Vec<&String> = args.iter().filter(|a| a.starts_with("-I")).collect();
    assert_eq!(includes, vec![
        &format!("-I{}", core.display()),
        &format!("-I{}", lib_a.display()),
        &format!("-I{}", lib_b.display()),
    ]);
    assert!(args.iter().any(|a| a == "-M"));
    assert!(args.iter().any(|a| a == "-MG"));
    assert_eq!(args.last(), Some(&fx.sketch.display().to_string()));
}

#[test]
fn relative_folders_do_not_turn_found_headers_into_missing_ones() {
    let fx = Fixture::in_working_dir();
    touch(&fx.path("libs/A/A.h"));
    let rel_header = fx.relative("libs/A/A.h");
    // the compiler echoes found headers relative to the folders it was given
    let compiler = fx.compiler(&format!(
        "echo \"sketch.o: $last {} B.h\"",
        rel_header.display()
    ));

    let report = GccProbe::new(compiler, Vec::new())
        .probe(&[fx.relative("libs/A")], &fx.sketch)
        .unwrap();
    assert_eq!(report.missing, vec![MissingHeader::new("B.h")]);
    assert_eq!(report.dependencies, vec![fx.path("libs/A/A.h")]);

    let args = fx.recorded_args();
    assert!(args.contains(&format!("-I{}", fx.path("libs/A").display())));
}

#[test]
fn relative_library_root_resolves_through_the_compiler() {
    let fx = Fixture::in_working_dir();
    touch(&fx.path("libs/A/A.h"));
    touch(&fx.path("libs/B/B.h"));
    let a_rel = fx.relative("libs/A/A.h");
    let b_abs = fx.path("libs/B/B.h");
    // A.h is reported relative, B.h stays missing until libs/B is passed
    let compiler = fx.compiler(&format!(
        "case \"$*\" in\n\
         *libs/B*) echo \"sketch.o: $last {a} {b}\" ;;\n\
         *libs/A*) echo \"sketch.o: $last {a} B.h\" ;;\n\
         *) echo \"sketch.o: $last A.h\" ;;\n\
         esac",
        a = a_rel.display(),
        b = b_abs.display(),
    ));

    let index = LibraryIndex::scan(&[fx.relative("libs")], &BTreeSet::new());
    let probe = GccProbe::new(compiler, Vec::new());
    let found = IncludeDiscovery::new(&index, &probe, "avr").run(&fx.sketch).unwrap();

    let names: Vec<&str> = found.imported_libraries.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);
    assert_eq!(found.dependencies, vec![fx.path("libs/A/A.h"), b_abs]);
}

#[test]
fn unresolvable_header_names_its_includer() {
    let fx = Fixture::new();
    let compiler = fx.compiler(
        "case \" $* \" in\n\
         *\" -MG \"*) echo \"sketch.o: $last Nope.h\" ;;\n\
         *) echo \"$last:2:10: fatal error: Nope.h: No such file or directory\" >&2; exit 1 ;;\n\
         esac",
    );

    let index = LibraryIndex::scan(&[fx.path("libs")], &BTreeSet::new());
    let probe = GccProbe::new(compiler, Vec::new());
    let err = IncludeDiscovery::new(&index, &probe, "avr").run(&fx.sketch).unwrap_err();
    match err {
        DiscoverError::UnresolvableHeader { header, included_from } => {
            assert_eq!(header, "Nope.h");
            assert_eq!(included_from, Some(fx.sketch.clone()));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn platform_and_system_headers_are_not_dependencies() {
    let fx = Fixture::new();
    let core = fx.path("hw/cores/arduino");
    let arduino_h = core.join("Arduino.h");
    let local = fx.path("build/sketch/config.h");
    touch(&arduino_h);
    touch(&local);
    let compiler = fx.compiler(&format!(
        "echo \"sketch.o: /usr/include/stdc-predef.h $last {} \\\\\"\n\
         echo \" /usr/lib/avr/include/avr/io.h {}\"",
        arduino_h.display(),
        local.display()
    ));

    let report = GccProbe::new(compiler, vec![core]).probe(&[], &fx.sketch).unwrap();
    assert_eq!(report.dependencies, vec![local]);
}

#[test]
fn failed_run_with_missing_header_diagnostic() {
    let fx = Fixture::new();
    let compiler = fx.compiler(
        "echo \"$last:1:10: fatal error: Servo.h: No such file or directory\" >&2\n\
         echo 'compilation terminated.' >&2\n\
         exit 1",
    );

    let report = GccProbe::new(compiler, Vec::new()).probe(&[], &fx.sketch).unwrap();
    assert_eq!(report.missing.len(), 1);
    assert_eq!(report.missing[0].name, "Servo.h");
    assert_eq!(report.missing[0].included_from.as_deref(), Some(fx.sketch.as_path()));
}

#[test]
fn unrelated_failure_is_a_probe_error() {
    let fx = Fixture::new();
    let compiler = fx.compiler("echo \"$last:4:1: error: expected ';' before '}' token\" >&2\nexit 1");

    let err = GccProbe::new(compiler, Vec::new()).probe(&[], &fx.sketch).unwrap_err();
    match err {
        DiscoverError::Probe { diagnostics, .. } => assert!(diagnostics.contains("expected ';'")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn malformed_rules_are_a_parse_error() {
    let fx = Fixture::new();
    let compiler = fx.compiler("echo 'no target here'");

    let err = GccProbe::new(compiler, Vec::new()).probe(&[], &fx.sketch).unwrap_err();
    assert!(matches!(err, DiscoverError::Parse { .. }));
}

#[test]
fn missing_compiler_is_reported() {
    let fx = Fixture::new();
    let compiler = CompilerConfig {
        path:  fx.path("no-such-dir/avr-g++"),
        flags: Vec::new(),
    };

    let err = GccProbe::new(compiler, Vec::new()).probe(&[], &fx.sketch).unwrap_err();
    assert!(matches!(err, DiscoverError::ToolchainNotFound(ref p) if p.ends_with("avr-g++")));
}
