//! Ordered first-match rule evaluation.
//!
//! [`RuleEngine`] is generic over the input and the target: it walks its
//! rules in list order and returns the first one whose predicate holds.
//! Ties are decided by position only, never by how strongly a rule matched.
//!
//! On top of it sits the keyword DSL used for article reclassification,
//! hot-reloaded from `config/reclassify_rules.json`:
//!
//! ```json
//! { "rules": [
//!   { "name": "sp500",
//!     "when": { "any_contains": ["s&p 500", "s&p500"] },
//!     "then": { "symbol": "SPY", "category": "Index Fund" } }
//! ] }
//! ```
//!
//! Conditions (all case-insensitive, whitespace-collapsed):
//! - `any_contains`: match if ANY phrase appears
//! - `all_contains`: match if ALL phrases appear
//! - `not_contains`: match if NONE of the phrases appear

use serde::Deserialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::SystemTime,
};

use crate::symbols::{INDEX_FUND_CATEGORY, MEGA_CAP_CATEGORY};

pub trait Predicate<I: ?Sized>: Send + Sync {
    fn matches(&self, input: &I) -> bool;
}

impl<I: ?Sized, F> Predicate<I> for F
where
    F: Fn(&I) -> bool + Send + Sync,
{
    fn matches(&self, input: &I) -> bool {
        self(input)
    }
}

pub struct Rule<I: ?Sized, T> {
    pub name: String,
    pub predicate: Box<dyn Predicate<I>>,
    pub target: T,
}

impl<I: ?Sized, T> Rule<I, T> {
    pub fn new(name: impl Into<String>, predicate: impl Predicate<I> + 'static, target: T) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
            target,
        }
    }
}

pub struct RuleEngine<I: ?Sized, T> {
    rules: Vec<Rule<I, T>>,
}

impl<I: ?Sized, T> Default for RuleEngine<I, T> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<I: ?Sized, T> RuleEngine<I, T> {
    pub fn new(rules: Vec<Rule<I, T>>) -> Self {
        Self { rules }
    }

    pub fn push(&mut self, rule: Rule<I, T>) {
        self.rules.push(rule);
    }

    pub fn first_match(&self, input: &I) -> Option<&Rule<I, T>> {
        self.rules.iter().find(|r| r.predicate.matches(input))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// --- keyword DSL ---

#[derive(Debug, Clone, Deserialize, Default)]
pub struct KeywordRuleSet {
    pub rules: Vec<KeywordRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeywordRule {
    pub name: Option<String>,
    #[serde(default)]
    pub when: When,
    pub then: Reassign,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct When {
    pub any_contains: Option<Vec<String>>,
    pub all_contains: Option<Vec<String>>,
    pub not_contains: Option<Vec<String>>,
}

/// Target of a reclassification rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Reassign {
    pub symbol: String,
    pub category: String,
}

impl When {
    /// A rule with no conditions never matches; it would swallow every article.
    fn is_empty(&self) -> bool {
        self.any_contains.is_none() && self.all_contains.is_none() && self.not_contains.is_none()
    }
}

impl Predicate<str> for When {
    fn matches(&self, text: &str) -> bool {
        if self.is_empty() {
            return false;
        }
        let text = normalize(text);
        if let Some(v) = &self.any_contains {
            if !v.iter().any(|p| contains(&text, p)) {
                return false;
            }
        }
        if let Some(v) = &self.all_contains {
            if !v.iter().all(|p| contains(&text, p)) {
                return false;
            }
        }
        if let Some(v) = &self.not_contains {
            if v.iter().any(|p| contains(&text, p)) {
                return false;
            }
        }
        true
    }
}

impl KeywordRuleSet {
    /// Compile into an evaluator; rule order is preserved.
    pub fn compile(&self) -> RuleEngine<str, Reassign> {
        let rules = self
            .rules
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let name = r
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("rule-{i}-{}", r.then.symbol));
                Rule::new(name, r.when.clone(), r.then.clone())
            })
            .collect();
        RuleEngine::new(rules)
    }

    /// Built-in symbol priority list: index funds first, then mega-caps.
    pub fn builtin() -> Self {
        let table: &[(&str, &str, &[&str])] = &[
            ("SPY", INDEX_FUND_CATEGORY, &["s&p 500", "s&p500", "sp500", "spdr s&p"]),
            ("QQQ", INDEX_FUND_CATEGORY, &["nasdaq 100", "nasdaq-100", "nasdaq composite", "qqq"]),
            ("DIA", INDEX_FUND_CATEGORY, &["dow jones", "djia", "dow industrials", "blue-chip index"]),
            ("AAPL", MEGA_CAP_CATEGORY, &["apple", "iphone", "tim cook"]),
            ("MSFT", MEGA_CAP_CATEGORY, &["microsoft", "azure", "satya nadella"]),
            ("GOOGL", MEGA_CAP_CATEGORY, &["alphabet", "google", "youtube"]),
            ("AMZN", MEGA_CAP_CATEGORY, &["amazon", "amazon web services", "andy jassy"]),
            ("NVDA", MEGA_CAP_CATEGORY, &["nvidia", "jensen huang"]),
            ("META", MEGA_CAP_CATEGORY, &["meta platforms", "facebook", "instagram", "zuckerberg"]),
            ("TSLA", MEGA_CAP_CATEGORY, &["tesla", "elon musk"]),
        ];
        let rules = table
            .iter()
            .map(|(symbol, category, words)| KeywordRule {
                name: Some(symbol.to_ascii_lowercase()),
                when: When {
                    any_contains: Some(words.iter().map(|w| w.to_string()).collect()),
                    ..When::default()
                },
                then: Reassign {
                    symbol: symbol.to_string(),
                    category: category.to_string(),
                },
            })
            .collect();
        Self { rules }
    }
}

/// Keyword rules reloaded from disk when the file's mtime changes.
/// A missing or invalid file keeps the previous rules (initially the built-ins).
pub struct HotReloadRules {
    path: PathBuf,
    inner: RwLock<State>,
}

struct State {
    engine: Arc<RuleEngine<str, Reassign>>,
    last_modified: Option<SystemTime>,
}

impl HotReloadRules {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_fallback(path, KeywordRuleSet::builtin())
    }

    pub fn with_fallback(path: impl Into<PathBuf>, fallback: KeywordRuleSet) -> Self {
        Self {
            path: path.into(),
            inner: RwLock::new(State {
                engine: Arc::new(fallback.compile()),
                last_modified: None,
            }),
        }
    }

    pub fn current(&self) -> Arc<RuleEngine<str, Reassign>> {
        let mtime = fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        let needs_reload = match (mtime, self.inner.read()) {
            (Some(m), Ok(g)) => g.last_modified != Some(m),
            _ => false,
        };

        if needs_reload {
            if let Ok(mut guard) = self.inner.write() {
                if guard.last_modified != mtime {
                    match load_rules_file(&self.path) {
                        Ok(set) => {
                            tracing::info!(path = %self.path.display(), rules = set.rules.len(), "reclassify rules reloaded");
                            guard.engine = Arc::new(set.compile());
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, path = %self.path.display(), "invalid reclassify rules; keeping previous");
                        }
                    }
                    guard.last_modified = mtime;
                }
            }
        }

        match self.inner.read() {
            Ok(g) => g.engine.clone(),
            Err(poisoned) => poisoned.into_inner().engine.clone(),
        }
    }
}

pub fn load_rules_file(path: &Path) -> io::Result<KeywordRuleSet> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

// --- internals ---

fn contains(normalized_text: &str, pat: &str) -> bool {
    let p = normalize(pat);
    if p.is_empty() {
        return false;
    }
    normalized_text.contains(p.as_str())
}

/// Lowercase + collapse whitespace runs into single spaces.
pub fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars().flat_map(char::to_lowercase) {
        if ch.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_match_wins_by_position() {
        let engine: RuleEngine<i32, &str> = RuleEngine::new(vec![
            Rule::new("even", |n: &i32| n % 2 == 0, "even"),
            Rule::new("small", |n: &i32| *n < 10, "small"),
        ]);
        assert_eq!(engine.first_match(&4).map(|r| r.target), Some("even"));
        assert_eq!(engine.first_match(&3).map(|r| r.target), Some("small"));
        assert!(engine.first_match(&11).is_none());
    }

    #[test]
    fn builtin_prefers_list_order_over_keyword_count() {
        let engine = KeywordRuleSet::builtin().compile();
        // Two DIA keywords, one SPY keyword: SPY is earlier in the list.
        let text = "Dow Jones and DJIA slip while the S&P 500 holds";
        let hit = engine.first_match(text).unwrap();
        assert_eq!(hit.target.symbol, "SPY");
    }

    #[test]
    fn case_and_whitespace_insensitive() {
        let when = When {
            any_contains: Some(vec!["dow   jones".into()]),
            ..Default::default()
        };
        assert!(when.matches("  the DOW\tJONES closed higher"));
        assert!(!when.matches("dowjones"));
    }

    #[test]
    fn empty_condition_never_matches() {
        assert!(!When::default().matches("anything"));
    }

    #[test]
    fn all_and_not_conditions() {
        let when = When {
            all_contains: Some(vec!["apple".into(), "earnings".into()]),
            not_contains: Some(vec!["pie".into()]),
            ..Default::default()
        };
        assert!(when.matches("Apple earnings beat"));
        assert!(!when.matches("Apple pie earnings"));
        assert!(!when.matches("Apple launches phone"));
    }

    #[test]
    fn hot_reload_picks_up_file_and_keeps_builtin_on_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");

        let hot = HotReloadRules::new(&path);
        assert_eq!(hot.current().len(), KeywordRuleSet::builtin().rules.len());

        fs::write(&path, "{ not json").unwrap();
        assert_eq!(hot.current().len(), KeywordRuleSet::builtin().rules.len());

        // Ensure a different mtime on coarse filesystems.
        std::thread::sleep(std::time::Duration::from_millis(1100));
        fs::write(
            &path,
            r#"{"rules":[{"name":"oil","when":{"any_contains":["crude"]},"then":{"symbol":"USO","category":"Commodity"}}]}"#,
        )
        .unwrap();
        let engine = hot.current();
        assert_eq!(engine.len(), 1);
        assert_eq!(
            engine.first_match("Crude rallies").map(|r| r.target.symbol.as_str()),
            Some("USO")
        );
    }
}
