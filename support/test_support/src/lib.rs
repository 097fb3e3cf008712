use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail, ensure};
use serde::Deserialize;

/// What a fixture program is expected to do when run.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseClass {
    /// Passes the frontend and runs to completion.
    RuntimeSuccess,
    /// Rejected by the parser or validator.
    FrontendError,
    /// Passes the frontend but fails while running.
    BackendRuntimeError,
}

/// Contents of a `case.yaml` file. Expectation entries name files next to it.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CaseSpec {
    pub class: CaseClass,
    /// Whether every backend must produce byte-identical output.
    #[serde(default)]
    pub parity: bool,
    /// Benchmark tag; untagged cases are not benchmarked.
    pub bench: Option<String>,
    /// Expected program output. For runtime errors, the output printed
    /// before the failure.
    pub stdout: Option<String>,
    /// Text the error message must contain.
    pub stderr_contains: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Case {
    pub name: String,
    pub dir: PathBuf,
    pub program_path: PathBuf,
    pub spec: CaseSpec,
}

impl Case {
    pub fn read_text(&self, relative_path: &str) -> Result<String> {
        fs::read_to_string(self.dir.join(relative_path))
            .with_context(|| format!("Reading {} fixture file {}", self.name, relative_path))
    }

    pub fn source(&self) -> Result<String> {
        fs::read_to_string(&self.program_path)
            .with_context(|| format!("Reading program of {}", self.name))
    }

    /// Expected stdout, if the case names one.
    pub fn expected_stdout(&self) -> Result<Option<String>> {
        self.spec
            .stdout
            .as_deref()
            .map(|file| self.read_text(file))
            .transpose()
    }

    pub fn expected_error(&self) -> Result<String> {
        let Some(file) = self.spec.stderr_contains.as_deref() else {
            bail!("Case {} has no stderr_contains file", self.name);
        };
        Ok(self.read_text(file)?.trim().to_string())
    }

    fn check_shape(&self) -> Result<()> {
        match self.spec.class {
            CaseClass::RuntimeSuccess => ensure!(
                self.spec.stdout.is_some() && self.spec.stderr_contains.is_none(),
                "Case {} must name stdout and no stderr_contains",
                self.name
            ),
            CaseClass::FrontendError | CaseClass::BackendRuntimeError => ensure!(
                self.spec.stderr_contains.is_some() && !self.spec.parity,
                "Case {} must name stderr_contains and cannot require parity",
                self.name
            ),
        }
        Ok(())
    }
}

/// Loads every `<dir>/<case>/case.yaml` with its `program.cat`, sorted by name.
pub fn load_cases(programs_dir: &Path) -> Result<Vec<Case>> {
    let mut cases = Vec::new();

    for entry in
        fs::read_dir(programs_dir).with_context(|| format!("Reading {}", programs_dir.display()))?
    {
        let dir = entry?.path();
        let case_path = dir.join("case.yaml");
        if !dir.is_dir() || !case_path.exists() {
            continue;
        }

        let program_path = dir.join("program.cat");
        ensure!(
            program_path.exists(),
            "Missing program.cat for case {}",
            dir.display()
        );
        let name = dir
            .file_name()
            .and_then(|value| value.to_str())
            .map(str::to_string)
            .with_context(|| format!("Invalid case directory name {}", dir.display()))?;
        let raw = fs::read_to_string(&case_path)
            .with_context(|| format!("Reading {}", case_path.display()))?;
        let spec: CaseSpec = serde_yaml::from_str(&raw)
            .with_context(|| format!("Parsing {}", case_path.display()))?;

        let case = Case {
            name,
            dir,
            program_path,
            spec,
        };
        case.check_shape()?;
        cases.push(case);
    }

    ensure!(
        !cases.is_empty(),
        "No test cases found in {}",
        programs_dir.display()
    );
    cases.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(cases)
}

pub fn normalize_output(output: &str) -> String {
    output.replace("\r\n", "\n").trim_end().to_string()
}

/// Cases used as benchmark workloads, paired with their tag.
pub fn bench_cases(programs_dir: &Path) -> Result<Vec<(String, Case)>> {
    Ok(load_cases(programs_dir)?
        .into_iter()
        .filter_map(|case| Some((case.spec.bench.clone()?, case)))
        .collect())
}
