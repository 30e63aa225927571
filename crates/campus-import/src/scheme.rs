//! Scheme engine: attribute-generation templates.
//!
//! A scheme is an immutable template string of literal text and placeholders,
//! compiled once at configuration load into an ordered fragment list so that
//! malformed schemes fail fast and evaluation is a simple walk:
//!
//! ```text
//! <firstname:lower>[0:1].<lastname:lower>[COUNTER2]
//! ```
//!
//! - `<name>` expands a source or previously derived attribute; `:lower`,
//!   `:upper` and `:umlauts` transforms apply left-to-right as declared.
//! - `<:transform>` (empty name) sets a scheme-wide default transform applied
//!   to every subsequent attribute placeholder before its own transforms.
//! - `[a:b]` directly after a placeholder takes a half-open character slice
//!   of the transformed expansion; out-of-range bounds are clamped.
//! - `[ALWAYSCOUNTER]` / `[COUNTER2]` append a disambiguation counter for the
//!   literal prefix computed so far; at most one, and only as the final
//!   fragment.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::counter::CounterStore;
use crate::error::SchemeError;

/// Fixed diacritic folding table. Runs before slicing so slice bounds
/// operate on the expanded string.
const UMLAUT_MAP: &[(char, &str)] = &[
    ('ä', "ae"),
    ('ö', "oe"),
    ('ü', "ue"),
    ('Ä', "Ae"),
    ('Ö', "Oe"),
    ('Ü', "Ue"),
    ('ß', "ss"),
    ('á', "a"),
    ('à', "a"),
    ('â', "a"),
    ('å', "a"),
    ('ã', "a"),
    ('é', "e"),
    ('è', "e"),
    ('ê', "e"),
    ('ë', "e"),
    ('í', "i"),
    ('ì', "i"),
    ('î', "i"),
    ('ó', "o"),
    ('ò', "o"),
    ('ô', "o"),
    ('õ', "o"),
    ('ú', "u"),
    ('ù', "u"),
    ('û', "u"),
    ('ç', "c"),
    ('ñ', "n"),
    ('ý', "y"),
    ('Á', "A"),
    ('À', "A"),
    ('Â', "A"),
    ('Å', "A"),
    ('É', "E"),
    ('È', "E"),
    ('Ê', "E"),
    ('Í', "I"),
    ('Ì', "I"),
    ('Ó', "O"),
    ('Ò', "O"),
    ('Ô', "O"),
    ('Ú', "U"),
    ('Ù', "U"),
    ('Ç', "C"),
    ('Ñ', "N"),
];

/// A case/diacritic transform inside a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    Lower,
    Upper,
    Umlauts,
}

impl Transform {
    fn parse(scheme: &str, name: &str) -> Result<Self, SchemeError> {
        match name {
            "lower" => Ok(Transform::Lower),
            "upper" => Ok(Transform::Upper),
            "umlauts" => Ok(Transform::Umlauts),
            _ => Err(SchemeError::UnknownTransform {
                scheme: scheme.to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Apply the transform to a value.
    #[must_use]
    pub fn apply(&self, value: &str) -> String {
        match self {
            Transform::Lower => value.to_lowercase(),
            Transform::Upper => value.to_uppercase(),
            Transform::Umlauts => fold_umlauts(value),
        }
    }
}

/// Expand diacritics to their base-Latin multi-character form (ö -> oe).
#[must_use]
pub fn fold_umlauts(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match UMLAUT_MAP.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => out.push_str(to),
            None => out.push(c),
        }
    }
    out
}

/// A half-open character slice with optional, clamped bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slice {
    pub start: Option<usize>,
    pub end: Option<usize>,
}

impl Slice {
    /// Apply the slice to a value, clamping out-of-range bounds.
    #[must_use]
    pub fn apply(&self, value: &str) -> String {
        let chars: Vec<char> = value.chars().collect();
        let start = self.start.unwrap_or(0).min(chars.len());
        let end = self.end.unwrap_or(chars.len()).min(chars.len());
        if start >= end {
            return String::new();
        }
        chars[start..end].iter().collect()
    }
}

/// Counter directive semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterMode {
    /// Every allocation gets a suffix, starting at 1.
    Always,
    /// The first claimant of a prefix stays unsuffixed; the second gets this
    /// number, counting up from there. `[COUNTER2]` is `FromSecond(2)`.
    FromSecond(u32),
}

/// A compiled scheme fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Literal(String),
    Attribute {
        name: String,
        transforms: Vec<Transform>,
        slice: Option<Slice>,
    },
    Counter(CounterMode),
}

/// A compiled, immutable scheme template.
#[derive(Debug, Clone)]
pub struct Scheme {
    raw: String,
    fragments: Vec<Fragment>,
}

impl Scheme {
    /// Compile a scheme string, failing fast on malformed templates.
    pub fn parse(input: &str) -> Result<Self, SchemeError> {
        let mut fragments: Vec<Fragment> = Vec::new();
        let mut defaults: Vec<Transform> = Vec::new();
        let mut literal = String::new();
        let mut last_was_attribute = false;
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '<' => {
                    if !literal.is_empty() {
                        fragments.push(Fragment::Literal(std::mem::take(&mut literal)));
                    }
                    let mut body = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '>' {
                            closed = true;
                            break;
                        }
                        body.push(c);
                    }
                    if !closed {
                        return Err(SchemeError::Unterminated {
                            scheme: input.to_string(),
                        });
                    }
                    let mut parts = body.split(':');
                    let name = parts.next().unwrap_or("").trim().to_string();
                    let own: Vec<Transform> = parts
                        .map(|t| Transform::parse(input, t.trim()))
                        .collect::<Result<_, _>>()?;
                    if name.is_empty() {
                        // Scheme-wide default transforms for subsequent placeholders
                        defaults.extend(own);
                        last_was_attribute = false;
                    } else {
                        let mut transforms = defaults.clone();
                        transforms.extend(own);
                        fragments.push(Fragment::Attribute {
                            name,
                            transforms,
                            slice: None,
                        });
                        last_was_attribute = true;
                    }
                }
                '[' => {
                    let mut body = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == ']' {
                            closed = true;
                            break;
                        }
                        body.push(c);
                    }
                    if !closed {
                        return Err(SchemeError::Unterminated {
                            scheme: input.to_string(),
                        });
                    }
                    if !literal.is_empty() {
                        fragments.push(Fragment::Literal(std::mem::take(&mut literal)));
                        last_was_attribute = false;
                    }
                    if let Some(counter) = parse_counter(input, &body)? {
                        fragments.push(Fragment::Counter(counter));
                        last_was_attribute = false;
                    } else if let Some(slice) = parse_slice(&body) {
                        match fragments.last_mut() {
                            Some(Fragment::Attribute { slice: s, .. })
                                if last_was_attribute && s.is_none() =>
                            {
                                *s = Some(slice);
                            }
                            _ => {
                                return Err(SchemeError::InvalidDirective {
                                    scheme: input.to_string(),
                                    directive: body,
                                })
                            }
                        }
                    } else {
                        return Err(SchemeError::InvalidDirective {
                            scheme: input.to_string(),
                            directive: body,
                        });
                    }
                }
                _ => {
                    literal.push(c);
                    last_was_attribute = false;
                }
            }
        }
        if !literal.is_empty() {
            fragments.push(Fragment::Literal(literal));
        }

        // Counter directives: at most one, and only as the final fragment
        let counters = fragments
            .iter()
            .filter(|f| matches!(f, Fragment::Counter(_)))
            .count();
        if counters > 1 {
            return Err(SchemeError::MultipleCounters {
                scheme: input.to_string(),
            });
        }
        if counters == 1 && !matches!(fragments.last(), Some(Fragment::Counter(_))) {
            return Err(SchemeError::CounterNotLast {
                scheme: input.to_string(),
            });
        }

        Ok(Self {
            raw: input.to_string(),
            fragments,
        })
    }

    /// The original template string.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The compiled fragments.
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// The counter directive, if the scheme has one.
    pub fn counter(&self) -> Option<CounterMode> {
        match self.fragments.last() {
            Some(Fragment::Counter(mode)) => Some(*mode),
            _ => None,
        }
    }

    /// Names of all attributes the scheme references.
    pub fn referenced_attributes(&self) -> impl Iterator<Item = &str> {
        self.fragments.iter().filter_map(|f| match f {
            Fragment::Attribute { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Evaluate the non-counter portion against resolved attribute values.
    ///
    /// Absent attributes expand to the empty string; presence is validated
    /// at compile time against the configured attribute universe.
    #[must_use]
    pub fn evaluate_prefix(&self, values: &HashMap<String, String>) -> String {
        let mut out = String::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Literal(text) => out.push_str(text),
                Fragment::Attribute {
                    name,
                    transforms,
                    slice,
                } => {
                    let mut value = values.get(name).cloned().unwrap_or_default();
                    for t in transforms {
                        value = t.apply(&value);
                    }
                    if let Some(slice) = slice {
                        value = slice.apply(&value);
                    }
                    out.push_str(&value);
                }
                Fragment::Counter(_) => {}
            }
        }
        out
    }
}

fn parse_counter(scheme: &str, body: &str) -> Result<Option<CounterMode>, SchemeError> {
    if body == "ALWAYSCOUNTER" {
        return Ok(Some(CounterMode::Always));
    }
    if let Some(rest) = body.strip_prefix("COUNTER") {
        let n: u32 = rest.parse().map_err(|_| SchemeError::InvalidDirective {
            scheme: scheme.to_string(),
            directive: body.to_string(),
        })?;
        if n < 2 {
            return Err(SchemeError::InvalidDirective {
                scheme: scheme.to_string(),
                directive: body.to_string(),
            });
        }
        return Ok(Some(CounterMode::FromSecond(n)));
    }
    Ok(None)
}

fn parse_slice(body: &str) -> Option<Slice> {
    let (start, end) = body.split_once(':')?;
    let parse_bound = |s: &str| -> Option<Option<usize>> {
        let s = s.trim();
        if s.is_empty() {
            Some(None)
        } else {
            s.parse::<usize>().ok().map(Some)
        }
    };
    Some(Slice {
        start: parse_bound(start)?,
        end: parse_bound(end)?,
    })
}

/// All configured schemes, compiled once per run.
///
/// Resolves scheme-derived attributes in dependency order: a username scheme
/// may reference `firstname` even when `firstname` is itself scheme-derived.
/// Unknown references and cycles are rejected at compile time.
#[derive(Debug, Clone, Default)]
pub struct CompiledSchemes {
    schemes: HashMap<String, Scheme>,
}

impl CompiledSchemes {
    /// Compile the configured attribute -> template table.
    ///
    /// `base_attributes` is the universe of directly mapped attribute names;
    /// every placeholder must reference one of those or another scheme.
    pub fn compile(
        schemes: &HashMap<String, String>,
        base_attributes: &HashSet<String>,
    ) -> Result<Self, SchemeError> {
        let mut compiled = HashMap::with_capacity(schemes.len());
        for (attribute, template) in schemes {
            compiled.insert(attribute.clone(), Scheme::parse(template)?);
        }

        for (attribute, scheme) in &compiled {
            for referenced in scheme.referenced_attributes() {
                if !base_attributes.contains(referenced) && !compiled.contains_key(referenced) {
                    return Err(SchemeError::UnknownAttribute {
                        scheme: scheme.raw.clone(),
                        attribute: referenced.to_string(),
                    });
                }
            }
            detect_cycle(attribute, &compiled)?;
        }

        Ok(Self { schemes: compiled })
    }

    /// Check if an attribute is scheme-derived.
    pub fn contains(&self, attribute: &str) -> bool {
        self.schemes.contains_key(attribute)
    }

    /// Names of all scheme-derived attributes.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.schemes.keys().map(String::as_str)
    }

    /// Evaluate every scheme for one record.
    ///
    /// `base` holds directly mapped values; a direct value wins over the
    /// scheme for the same attribute. Returns base plus all derived values.
    pub fn evaluate_all(
        &self,
        base: &HashMap<String, String>,
        counters: &mut CounterStore,
    ) -> Result<HashMap<String, String>, SchemeError> {
        let mut resolved = base.clone();
        for attribute in self.schemes.keys() {
            self.resolve(attribute, &mut resolved, counters)?;
        }
        Ok(resolved)
    }

    fn resolve(
        &self,
        attribute: &str,
        resolved: &mut HashMap<String, String>,
        counters: &mut CounterStore,
    ) -> Result<String, SchemeError> {
        if let Some(value) = resolved.get(attribute) {
            if !value.is_empty() {
                return Ok(value.clone());
            }
        }
        let Some(scheme) = self.schemes.get(attribute) else {
            return Ok(resolved.get(attribute).cloned().unwrap_or_default());
        };

        // Dependencies first; an empty direct value falls back to its scheme
        for referenced in scheme.referenced_attributes() {
            let unresolved = resolved.get(referenced).map_or(true, String::is_empty);
            if referenced != attribute && unresolved && self.schemes.contains_key(referenced) {
                self.resolve(referenced, resolved, counters)?;
            }
        }

        let prefix = scheme.evaluate_prefix(resolved);
        let value = match scheme.counter() {
            Some(mode) => {
                let suffix = counters.allocate(&format!("{attribute}:{prefix}"), mode);
                format!("{prefix}{suffix}")
            }
            None => prefix,
        };
        resolved.insert(attribute.to_string(), value.clone());
        Ok(value)
    }
}

/// DFS over the scheme dependency graph, rejecting cycles.
fn detect_cycle(start: &str, schemes: &HashMap<String, Scheme>) -> Result<(), SchemeError> {
    fn visit<'a>(
        node: &'a str,
        schemes: &'a HashMap<String, Scheme>,
        in_progress: &mut HashSet<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Result<(), SchemeError> {
        if done.contains(node) {
            return Ok(());
        }
        if !in_progress.insert(node) {
            return Err(SchemeError::Cycle {
                attribute: node.to_string(),
            });
        }
        if let Some(scheme) = schemes.get(node) {
            for referenced in scheme.referenced_attributes() {
                if schemes.contains_key(referenced) {
                    visit(referenced, schemes, in_progress, done)?;
                }
            }
        }
        in_progress.remove(node);
        done.insert(node);
        Ok(())
    }

    let mut in_progress = HashSet::new();
    let mut done = HashSet::new();
    visit(start, schemes, &mut in_progress, &mut done)
}
