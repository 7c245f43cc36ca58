//! Deterministic YAML-fixture replay (§4.7, §6.6).
//!
//! A corpus is a directory holding `in.yaml`, an optional `_setup.yaml`,
//! and `out.yaml`. Running one means: read `_setup.yaml` then `in.yaml`
//! as concatenated text-YAML documents, hand their events to the
//! component under test, and capture everything the component writes
//! back out as text-YAML for comparison against `out.yaml`.
//!
//! Rust has no runtime proxy generation, so unlike the source — which
//! reflectively builds `in`/`out` interface proxies around the fixture
//! files — this harness does not wire a component itself. It hands the
//! caller an [`input_wire`](Corpus::input_wire) already positioned over
//! `_setup.yaml` + `in.yaml`'s documents for the caller's own
//! [`crate::event::WireParser::accept`] loop to drain, and leaves the
//! caller to point its [`crate::method::MethodWriter`] at a second,
//! captured `TextWire` it later hands to [`Corpus::check`]. What this
//! module owns is the part of §4.7 independent of any one component's
//! method surface: fixture I/O, normalization, diffing, regression-mode
//! overwrite, agitation, and a deterministic clock.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bytes::BytesMut;
use crate::config::HarnessConfig;
use crate::date::SettableClock;
use crate::error::{Error, Result};
use crate::wire::TextWire;

/// One `in.yaml` / `out.yaml` fixture directory (§6.6).
pub struct Corpus {
    dir: PathBuf,
}

impl Corpus {
    /// Opens `dir` as a corpus. Fails if it has no `in.yaml` — every
    /// corpus must have one (§6.6); `_setup.yaml` and `out.yaml` are
    /// optional and missing/absent respectively are treated as empty.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Corpus> {
        let dir = dir.into();
        if !dir.join("in.yaml").is_file() {
            return Err(Error::protocol_violation(format!(
                "corpus {} has no in.yaml",
                dir.display()
            )));
        }
        Ok(Corpus { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_optional(&self, name: &str) -> Result<String> {
        match fs::read_to_string(self.dir.join(name)) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(Error::from(e)),
        }
    }

    /// `_setup.yaml`'s raw text, or empty if this corpus has none.
    pub fn setup_text(&self) -> Result<String> {
        self.read_optional("_setup.yaml")
    }

    /// `in.yaml`'s raw text.
    pub fn input_text(&self) -> Result<String> {
        fs::read_to_string(self.dir.join("in.yaml")).map_err(Error::from)
    }

    /// A `TextWire` positioned to read `_setup.yaml`'s documents (if any)
    /// followed by `in.yaml`'s, in file order — the source a corpus's
    /// `WireParser` drains to initialize, then drive, the component
    /// under test (§4.7 steps 1–2).
    pub fn input_wire(&self) -> Result<TextWire> {
        Ok(text_wire_over(&format!("{}{}", self.setup_text()?, self.input_text()?)))
    }

    /// `out.yaml`'s text, normalized (§4.7 "Normalization").
    pub fn expected(&self) -> Result<String> {
        Ok(normalize(&self.read_optional("out.yaml")?))
    }

    /// `out-<variant>.yaml`'s text, normalized — the expectation an
    /// [`Agitation`] named `variant` is checked against.
    pub fn expected_variant(&self, variant: &str) -> Result<String> {
        Ok(normalize(&self.read_optional(&format!("out-{}.yaml", variant))?))
    }

    /// Compares `actual` against `out.yaml`, after normalizing both.
    ///
    /// In `regress.tests` mode (§4.7 "Regress mode"), `out.yaml` is
    /// overwritten with `actual` instead of being asserted against, so a
    /// whole corpus tree can be bulk-regenerated and the change reviewed
    /// by diff.
    pub fn check(&self, actual: &str) -> Result<()> {
        self.check_against("out.yaml", actual)
    }

    /// The agitated-case counterpart of [`Corpus::check`]: compares
    /// `actual` against `out-<variant>.yaml`.
    pub fn check_variant(&self, variant: &str, actual: &str) -> Result<()> {
        self.check_against(&format!("out-{}.yaml", variant), actual)
    }

    fn check_against(&self, file_name: &str, actual: &str) -> Result<()> {
        let actual = normalize(actual);
        let config = HarnessConfig::current();
        if config.dump_code {
            eprintln!("--- {}/{} (actual) ---\n{}", self.dir.display(), file_name, actual);
        }
        if config.regress_tests {
            fs::write(self.dir.join(file_name), &actual).map_err(Error::from)?;
            log::info!("regenerated {}/{}", self.dir.display(), file_name);
            return Ok(());
        }
        let expected = normalize(&self.read_optional(file_name)?);
        if expected != actual {
            return Err(Error::protocol_violation(format!(
                "{}/{} mismatch:\n{}",
                self.dir.display(),
                file_name,
                line_diff(&expected, &actual)
            )));
        }
        Ok(())
    }

    /// Applies every agitation in `agitations` to this corpus's
    /// `in.yaml`, pairing each perturbed input with its own
    /// `out-<name>.yaml` expectation (§4.7 "Agitation"). The caller
    /// replays each [`AgitatedCase::wire`] through the same driver used
    /// for the base case and checks the result with
    /// [`Corpus::check_variant`].
    pub fn agitated_cases(&self, agitations: &[Agitation]) -> Result<Vec<AgitatedCase>> {
        let setup = self.setup_text()?;
        let input = self.input_text()?;
        agitations
            .iter()
            .map(|agitation| {
                let perturbed_input = agitation.apply(&input);
                Ok(AgitatedCase {
                    name: agitation.name.clone(),
                    wire: text_wire_over(&format!("{}{}", setup, perturbed_input)),
                    expected: self.expected_variant(&agitation.name)?,
                })
            })
            .collect()
    }
}

fn text_wire_over(text: &str) -> TextWire {
    TextWire::from_bytes(BytesMut::from_vec(text.as_bytes().to_vec()))
}

/// One perturbation produced against a corpus's base case, ready to
/// replay through the same driver as the base case and check against its
/// own expectation.
pub struct AgitatedCase {
    pub name: String,
    pub wire: TextWire,
    pub expected: String,
}

/// Collapses trailing whitespace and unifies line endings, the baseline
/// fixture normalization of §4.7. A caller that also needs "an
/// input-transformation function" applies its own closure before calling
/// [`Corpus::check`]; this crate does not presume what that transform is.
pub fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// A line-by-line `expected`/`actual` rendering for a failed [`Corpus::check`]
/// — every differing line number prefixed `-`/`+`, matching lines left out,
/// so a failure points straight at the line that changed instead of
/// reprinting both whole fixtures.
fn line_diff(expected: &str, actual: &str) -> String {
    let expected_lines: Vec<&str> = expected.lines().collect();
    let actual_lines: Vec<&str> = actual.lines().collect();
    let mut out = String::new();
    for i in 0..expected_lines.len().max(actual_lines.len()) {
        match (expected_lines.get(i), actual_lines.get(i)) {
            (Some(e), Some(a)) if e == a => continue,
            (Some(e), Some(a)) => out.push_str(&format!("{:>4} -{}\n{:>4} +{}\n", i + 1, e, i + 1, a)),
            (Some(e), None) => out.push_str(&format!("{:>4} -{}\n", i + 1, e)),
            (None, Some(a)) => out.push_str(&format!("{:>4} +{}\n", i + 1, a)),
            (None, None) => unreachable!(),
        }
    }
    out
}

/// A deterministic perturbation of a corpus's `in.yaml`, mapped to an
/// alternate `out-<name>.yaml` expectation (§4.7 "Agitator": "produces
/// perturbed inputs... mapped to alternate out-<name>.yaml expectations").
pub struct Agitation {
    name: String,
    perturb: Box<dyn Fn(&str) -> String + Send + Sync>,
}

impl Agitation {
    pub fn new(name: impl Into<String>, perturb: impl Fn(&str) -> String + Send + Sync + 'static) -> Agitation {
        Agitation {
            name: name.into(),
            perturb: Box::new(perturb),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, input: &str) -> String {
        (self.perturb)(input)
    }

    /// Reverses the order of a fixture's top-level mapping entries,
    /// keeping each entry's own nested lines attached to it — the
    /// simplest perturbation exercising "reads fields by name matching"
    /// rather than by position (§4.4).
    pub fn reversed_top_level_entries() -> Agitation {
        Agitation::new("reversed-fields", reverse_top_level_groups)
    }

    /// Deletes every top-level entry (and its nested continuation lines)
    /// keyed `field`, exercising "missing fields are left at default"
    /// (§4.4).
    pub fn omit_field(field: impl Into<String>) -> Agitation {
        let field = field.into();
        Agitation::new(format!("omit-{}", field), move |text| omit_top_level_entry(text, &field))
    }
}

/// Splits `text` into groups, each a top-level (zero-indent) line plus
/// every following more-indented line, and returns the groups joined
/// back together in some order. Shared by `reverse_top_level_groups` and
/// `omit_top_level_entry`.
fn top_level_groups(text: &str) -> Vec<String> {
    let mut groups: Vec<String> = Vec::new();
    for line in text.lines() {
        let indent = line.len() - line.trim_start().len();
        if indent == 0 && !line.trim().is_empty() {
            groups.push(String::new());
        }
        if let Some(group) = groups.last_mut() {
            if !group.is_empty() {
                group.push('\n');
            }
            group.push_str(line);
        }
    }
    groups
}

fn reverse_top_level_groups(text: &str) -> String {
    let mut groups = top_level_groups(text);
    groups.reverse();
    groups.join("\n")
}

fn omit_top_level_entry(text: &str, field: &str) -> String {
    let prefix = format!("{}:", field);
    top_level_groups(text)
        .into_iter()
        .filter(|group| !group.trim_start().starts_with(&prefix))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Recursively discovers every corpus directory (one containing
/// `in.yaml`) under `root`, depth-first in directory-entry order. When
/// [`HarnessConfig::current`]'s `base_tests` flag is set, `root`'s
/// sibling directory named `base` is scanned too (§6.6 `base.tests`
/// "widens the corpus search to also cover the base fixture set").
pub fn discover_corpora(root: impl AsRef<Path>) -> Result<Vec<Corpus>> {
    let root = root.as_ref();
    let mut found = Vec::new();
    collect_corpora(root, &mut found)?;
    if HarnessConfig::current().base_tests {
        let base = root.join("base");
        if base.is_dir() {
            collect_corpora(&base, &mut found)?;
        }
    }
    Ok(found)
}

fn collect_corpora(dir: &Path, found: &mut Vec<Corpus>) -> Result<()> {
    if dir.join("in.yaml").is_file() {
        found.push(Corpus { dir: dir.to_path_buf() });
        return Ok(());
    }
    if !dir.is_dir() {
        return Ok(());
    }
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(Error::from)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    entries.sort();
    for path in entries {
        collect_corpora(&path, found)?;
    }
    Ok(())
}

/// A clock pinned to the Unix epoch, auto-incrementing by one
/// microsecond per read — the harness's default deterministic clock
/// (§4.7 "a typical setup auto-increments by 1 µs per read"), for tests
/// to hand to [`crate::method::MethodWriter::set_clock`] so two runs of
/// the same corpus stamp byte-identical history.
pub fn deterministic_clock() -> Arc<SettableClock> {
    Arc::new(SettableClock::epoch())
}
