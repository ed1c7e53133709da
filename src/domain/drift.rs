//! Drift comparator: diff a source-of-truth configuration tree against the
//! tree observed on a device.
//!
//! Both trees are arbitrary JSON values. The walk covers the union of keys at
//! every level; each leaf (or type mismatch) visited counts as one compared
//! path, and each compared path yields at most one difference.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use async_graphql::{ComplexObject, Enum, Json, SimpleObject};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key prefixes treated as security/connectivity-sensitive when no rule matches.
const CRITICAL_KEY_PREFIXES: &[&str] = &[
    "vlan",
    "acl",
    "access-list",
    "access_list",
    "firewall",
    "security",
    "trunk",
];

/// How a path diverges between the two trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
pub enum DifferenceKind {
    /// Present in the source of truth, absent on the device.
    Missing,
    /// Present on the device, absent in the source of truth.
    Extra,
    /// Present on both sides with different values.
    Different,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for DifferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Missing => "missing",
            Self::Extra => "extra",
            Self::Different => "different",
        })
    }
}

/// A single path where source and device disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SimpleObject)]
#[graphql(complex)]
pub struct ConfigDifference {
    pub path: String,
    /// `null` when the path is absent from the source of truth.
    #[graphql(skip)]
    pub source_value: Value,
    /// `null` when the path is absent on the device.
    #[graphql(skip)]
    pub device_value: Value,
    pub kind: DifferenceKind,
    pub severity: Severity,
}

#[ComplexObject]
impl ConfigDifference {
    #[graphql(name = "sourceValue")]
    async fn graphql_source_value(&self) -> Json<Value> {
        Json(self.source_value.clone())
    }

    #[graphql(name = "deviceValue")]
    async fn graphql_device_value(&self) -> Json<Value> {
        Json(self.device_value.clone())
    }
}

/// Map paths matching `pattern` to `severity`.
///
/// Patterns are dotted globs matched segment by segment, ignoring case:
/// `*` matches one segment, `**` any number of segments (including none),
/// and a trailing `*` inside a segment matches by prefix (`vlan*`). Array
/// indices are segments too: `acl[*]` and `acl.*` are equivalent. A pattern
/// must cover the whole path; use a trailing `.**` to cover a subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityRule {
    pub pattern: String,
    pub severity: Severity,
}

impl SeverityRule {
    pub fn new(pattern: impl Into<String>, severity: Severity) -> Self {
        Self {
            pattern: pattern.into(),
            severity,
        }
    }
}

/// Result of comparing two trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub differences: Vec<ConfigDifference>,
    pub total_paths: usize,
    pub drift_percentage: f64,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.differences.is_empty()
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.differences
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Compare `source` (desired state) against `device` (observed state).
///
/// Severity comes from the first rule in `rules` matching the path, falling
/// back to `Critical` for sensitive keys (VLANs, ACLs, firewall, trunking)
/// and `Info` for everything else.
pub fn compare(source: &Value, device: &Value, rules: &[SeverityRule]) -> DriftReport {
    let mut walker = Walker {
        classifier: Classifier::new(rules),
        path: Vec::new(),
        differences: Vec::new(),
        total_paths: 0,
    };
    walker.walk(Some(source), Some(device));

    let drift_percentage = drift_percentage(walker.differences.len(), walker.total_paths);
    DriftReport {
        differences: walker.differences,
        total_paths: walker.total_paths,
        drift_percentage,
    }
}

/// Percentage of differing paths, rounded to one decimal. Any drift at all
/// reports at least 0.1 so that zero always means "no differences".
pub fn drift_percentage(differences: usize, total_paths: usize) -> f64 {
    if differences == 0 || total_paths == 0 {
        return 0.0;
    }
    let pct = (differences as f64 * 1000.0 / total_paths as f64).round() / 10.0;
    pct.clamp(0.1, 100.0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    fn matches(&self, pattern: &PatternSegment) -> bool {
        let text = match self {
            Segment::Key(key) => key.to_lowercase(),
            Segment::Index(i) => i.to_string(),
        };
        match pattern {
            PatternSegment::AnyDepth => true,
            PatternSegment::Quoted(key) => text == *key,
            PatternSegment::Glob(p) if p == "*" => true,
            PatternSegment::Glob(p) => match p.strip_suffix('*') {
                Some(prefix) => text.starts_with(prefix),
                None => text == *p,
            },
        }
    }
}

/// One segment of a severity-rule pattern, lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    /// `**`: zero or more path segments.
    AnyDepth,
    /// `*`, `name` or `prefix*`.
    Glob(String),
    /// `["key"]`: matched literally, dots and stars included.
    Quoted(String),
}

fn render_path(segments: &[Segment]) -> String {
    if segments.is_empty() {
        return "$".to_string();
    }
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Index(i) => {
                let _ = write!(out, "[{i}]");
            }
            Segment::Key(key) if key.contains(['.', '[', ']']) || key.is_empty() => {
                let _ = write!(out, "[{key:?}]");
            }
            Segment::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
        }
    }
    out
}

struct Classifier {
    rules: Vec<(Vec<PatternSegment>, Severity)>,
}

impl Classifier {
    fn new(rules: &[SeverityRule]) -> Self {
        Self {
            rules: rules
                .iter()
                .map(|r| (pattern_segments(&r.pattern), r.severity))
                .collect(),
        }
    }

    fn classify(&self, path: &[Segment]) -> Severity {
        if let Some((_, severity)) = self.rules.iter().find(|(p, _)| glob(p, path)) {
            return *severity;
        }
        let sensitive = path.iter().any(|segment| match segment {
            Segment::Key(key) => {
                let key = key.to_lowercase();
                CRITICAL_KEY_PREFIXES.iter().any(|p| key.starts_with(p))
            }
            Segment::Index(_) => false,
        });
        if sensitive {
            Severity::Critical
        } else {
            Severity::Info
        }
    }
}

/// Split a rule pattern the way `render_path` joins a path: `.` between
/// keys, `[i]` for indices and `["key"]` for keys that need quoting.
fn pattern_segments(pattern: &str) -> Vec<PatternSegment> {
    fn flush(current: &mut String, segments: &mut Vec<PatternSegment>) {
        if current.is_empty() {
            return;
        }
        let text = std::mem::take(current).to_lowercase();
        segments.push(if text == "**" {
            PatternSegment::AnyDepth
        } else {
            PatternSegment::Glob(text)
        });
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '[' if chars.peek() == Some(&'"') => {
                flush(&mut current, &mut segments);
                chars.next();
                let mut key = String::new();
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => key.extend(chars.next()),
                        '"' => break,
                        c => key.push(c),
                    }
                }
                if chars.peek() == Some(&']') {
                    chars.next();
                }
                segments.push(PatternSegment::Quoted(key.to_lowercase()));
            }
            '.' | '[' | ']' => flush(&mut current, &mut segments),
            c => current.push(c),
        }
    }
    flush(&mut current, &mut segments);
    segments
}

fn glob(pattern: &[PatternSegment], path: &[Segment]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((PatternSegment::AnyDepth, rest)) => (0..=path.len()).any(|i| glob(rest, &path[i..])),
        Some((head, rest)) => path
            .split_first()
            .is_some_and(|(segment, tail)| segment.matches(head) && glob(rest, tail)),
    }
}

struct Walker {
    classifier: Classifier,
    path: Vec<Segment>,
    differences: Vec<ConfigDifference>,
    total_paths: usize,
}

impl Walker {
    fn walk(&mut self, source: Option<&Value>, device: Option<&Value>) {
        match (source, device) {
            (Some(Value::Object(s)), Some(Value::Object(d))) => {
                let keys: BTreeSet<&String> = s.keys().chain(d.keys()).collect();
                for key in keys {
                    self.path.push(Segment::Key(key.clone()));
                    self.walk(s.get(key), d.get(key));
                    self.path.pop();
                }
            }
            (Some(Value::Array(s)), Some(Value::Array(d))) => {
                for i in 0..s.len().max(d.len()) {
                    self.path.push(Segment::Index(i));
                    self.walk(s.get(i), d.get(i));
                    self.path.pop();
                }
            }
            // Equal leaves, unequal leaves, and type mismatches alike count
            // as one path; mismatched containers are not descended into.
            (Some(s), Some(d)) => {
                self.total_paths += 1;
                if s != d {
                    self.emit(DifferenceKind::Different, s.clone(), d.clone());
                }
            }
            (Some(s), None) => self.emit_subtree(s, DifferenceKind::Missing),
            (None, Some(d)) => self.emit_subtree(d, DifferenceKind::Extra),
            (None, None) => {}
        }
    }

    /// Report every leaf under a value that exists on one side only.
    fn emit_subtree(&mut self, value: &Value, kind: DifferenceKind) {
        match value {
            Value::Object(map) if !map.is_empty() => {
                let keys: BTreeSet<&String> = map.keys().collect();
                for key in keys {
                    self.path.push(Segment::Key(key.clone()));
                    self.emit_subtree(&map[key.as_str()], kind);
                    self.path.pop();
                }
            }
            Value::Array(items) if !items.is_empty() => {
                for (i, item) in items.iter().enumerate() {
                    self.path.push(Segment::Index(i));
                    self.emit_subtree(item, kind);
                    self.path.pop();
                }
            }
            leaf => {
                self.total_paths += 1;
                let (source_value, device_value) = match kind {
                    DifferenceKind::Missing => (leaf.clone(), Value::Null),
                    _ => (Value::Null, leaf.clone()),
                };
                self.emit(kind, source_value, device_value);
            }
        }
    }

    fn emit(&mut self, kind: DifferenceKind, source_value: Value, device_value: Value) {
        self.differences.push(ConfigDifference {
            path: render_path(&self.path),
            source_value,
            device_value,
            kind,
            severity: self.classifier.classify(&self.path),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tree() -> Value {
        json!({
            "hostname": "core-sw-1",
            "interfaces": {
                "GigabitEthernet0/1": {"description": "Server Connection", "enabled": true, "mtu": 9000},
                "GigabitEthernet0/2": {"description": "Uplink", "enabled": false}
            },
            "vlans": {"100": {"name": "Production", "vid": 100}, "200": {"name": "Guest", "vid": 200}},
            "acl": [{"action": "permit", "src": "10.0.0.0/8"}, {"action": "deny", "src": "any"}],
            "ntp": [],
            "banner": null
        })
    }

    #[test]
    fn identical_trees_have_no_drift() {
        for tree in [json!({}), json!([]), json!(42), sample_tree()] {
            let report = compare(&tree, &tree, &[]);
            assert!(report.differences.is_empty(), "{tree}");
            assert_eq!(report.drift_percentage, 0.0);
        }
    }

    #[test]
    fn identical_vlan_tree_scenario() {
        let tree = json!({"vlan": {"id": 100, "name": "Prod"}});
        let report = compare(&tree, &tree.clone(), &[]);
        assert!(report.differences.is_empty());
        assert_eq!(report.drift_percentage, 0.0);
        assert_eq!(report.total_paths, 2);
    }

    #[test]
    fn missing_subtree_reports_each_leaf() {
        let report = compare(&json!({"vlan": {"id": 100}}), &json!({}), &[]);
        assert_eq!(
            report.differences,
            vec![ConfigDifference {
                path: "vlan.id".to_string(),
                source_value: json!(100),
                device_value: Value::Null,
                kind: DifferenceKind::Missing,
                severity: Severity::Critical,
            }]
        );
        assert_eq!(report.drift_percentage, 100.0);
    }

    #[test]
    fn extra_and_different_are_classified() {
        let source = json!({"hostname": "sw1", "snmp": {"community": "public"}});
        let device = json!({"hostname": "sw1-old", "snmp": {"community": "public", "contact": "noc"}});
        let report = compare(&source, &device, &[]);

        assert_eq!(report.total_paths, 3);
        let kinds: Vec<_> = report
            .differences
            .iter()
            .map(|d| (d.path.as_str(), d.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("hostname", DifferenceKind::Different),
                ("snmp.contact", DifferenceKind::Extra),
            ]
        );
        let extra = &report.differences[1];
        assert_eq!(extra.source_value, Value::Null);
        assert_eq!(extra.device_value, json!("noc"));
        assert_eq!(report.drift_percentage, 66.7);
    }

    #[test]
    fn type_mismatch_is_one_difference_without_descent() {
        let source = json!({"vlans": {"100": {"name": "Prod"}, "200": {"name": "Guest"}}});
        let device = json!({"vlans": "none"});
        let report = compare(&source, &device, &[]);
        assert_eq!(report.differences.len(), 1);
        let diff = &report.differences[0];
        assert_eq!(diff.path, "vlans");
        assert_eq!(diff.kind, DifferenceKind::Different);
        assert_eq!(diff.device_value, json!("none"));
        assert_eq!(report.total_paths, 1);
        assert_eq!(report.drift_percentage, 100.0);
    }

    #[test]
    fn arrays_are_compared_by_index() {
        let source = json!({"acl": [{"action": "permit"}, {"action": "deny"}]});
        let device = json!({"acl": [{"action": "permit"}]});
        let report = compare(&source, &device, &[]);
        assert_eq!(report.differences.len(), 1);
        assert_eq!(report.differences[0].path, "acl[1].action");
        assert_eq!(report.differences[0].kind, DifferenceKind::Missing);
    }

    #[test]
    fn empty_containers_are_leaves_when_one_sided() {
        let report = compare(&json!({"vlans": {}, "ntp": []}), &json!({}), &[]);
        let paths: Vec<_> = report.differences.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["ntp", "vlans"]);
        assert_eq!(report.differences[1].source_value, json!({}));
    }

    #[test]
    fn numbers_compare_by_value_not_representation() {
        let report = compare(&json!({"mtu": 1500}), &json!({"mtu": 1500}), &[]);
        assert!(report.is_clean());
        let report = compare(&json!({"mtu": 1500}), &json!({"mtu": "1500"}), &[]);
        assert_eq!(report.differences[0].kind, DifferenceKind::Different);
    }

    #[test]
    fn keys_with_dots_are_bracket_quoted() {
        let source = json!({"hosts": {"10.0.0.1": {"name": "a"}}});
        let report = compare(&source, &json!({"hosts": {}}), &[]);
        assert_eq!(report.differences[0].path, r#"hosts["10.0.0.1"].name"#);
    }

    #[test]
    fn root_scalar_mismatch_uses_root_path() {
        let report = compare(&json!(1), &json!(2), &[]);
        assert_eq!(report.differences[0].path, "$");
    }

    #[test]
    fn drift_stays_within_bounds_and_zero_only_when_clean() {
        let mut source = serde_json::Map::new();
        for i in 0..2000 {
            source.insert(format!("k{i}"), json!(i));
        }
        let source = Value::Object(source);
        let mut device = source.clone();
        device["k7"] = json!("changed");

        let report = compare(&source, &device, &[]);
        assert_eq!(report.differences.len(), 1);
        assert!(report.drift_percentage > 0.0);
        assert!(report.drift_percentage <= 100.0);

        let report = compare(&sample_tree(), &json!({"unrelated": true}), &[]);
        assert!(report.drift_percentage <= 100.0);
        assert_eq!(report.drift_percentage, 100.0);
    }

    #[test]
    fn kinds_follow_side_presence() {
        let source = sample_tree();
        let device = json!({
            "hostname": "core-sw-2",
            "interfaces": {"GigabitEthernet0/1": {"description": "Legacy Server", "enabled": true}},
            "vlans": {"100": {"name": "Production", "vid": 100}, "300": {"name": "Lab", "vid": 300}},
            "logging": {"host": "10.9.9.9"}
        });
        let report = compare(&source, &device, &[]);
        for diff in &report.differences {
            match diff.kind {
                DifferenceKind::Missing => assert_eq!(diff.device_value, Value::Null, "{}", diff.path),
                DifferenceKind::Extra => assert_eq!(diff.source_value, Value::Null, "{}", diff.path),
                DifferenceKind::Different => {
                    assert_ne!(diff.source_value, diff.device_value, "{}", diff.path)
                }
            }
        }
        let find = |path: &str| report.differences.iter().find(|d| d.path == path).unwrap();
        assert_eq!(find("interfaces.GigabitEthernet0/1.mtu").kind, DifferenceKind::Missing);
        assert_eq!(find("vlans.300.vid").kind, DifferenceKind::Extra);
        assert_eq!(find("vlans.200.name").severity, Severity::Critical);
        assert_eq!(
            find("interfaces.GigabitEthernet0/1.description").severity,
            Severity::Info
        );
    }

    #[test]
    fn first_matching_rule_wins() {
        let source = json!({"interfaces": {"Gi0/1": {"description": "a"}}, "vlans": {"10": {"name": "x"}}});
        let device = json!({"interfaces": {"Gi0/1": {"description": "b"}}, "vlans": {"10": {"name": "y"}}});
        let rules = vec![
            SeverityRule::new("interfaces.*.description", Severity::Warning),
            SeverityRule::new("interfaces.**", Severity::Critical),
            SeverityRule::new("vlans.**", Severity::Info),
        ];
        let report = compare(&source, &device, &rules);
        assert_eq!(report.differences[0].path, "interfaces.Gi0/1.description");
        assert_eq!(report.differences[0].severity, Severity::Warning);
        // An explicit rule overrides the sensitive-key default.
        assert_eq!(report.differences[1].severity, Severity::Info);

        let reversed: Vec<_> = rules.into_iter().rev().collect();
        let report = compare(&source, &device, &reversed);
        assert_eq!(report.differences[0].severity, Severity::Critical);
    }

    #[test]
    fn rule_patterns_support_indices_prefixes_and_case() {
        let path = vec![
            Segment::Key("ACL".to_string()),
            Segment::Index(3),
            Segment::Key("action".to_string()),
        ];
        assert!(glob(&pattern_segments("acl[3].action"), &path));
        assert!(glob(&pattern_segments("acl[*].action"), &path));
        assert!(glob(&pattern_segments("ac*.*.action"), &path));
        assert!(glob(&pattern_segments("**.action"), &path));
        assert!(glob(&pattern_segments("**"), &path));
        assert!(!glob(&pattern_segments("acl"), &path));
        assert!(!glob(&pattern_segments("acl.*"), &path));
    }

    #[test]
    fn quoted_pattern_segment_targets_a_dotted_key() {
        assert_eq!(
            pattern_segments(r#"hosts["10.0.0.1"].name"#),
            vec![
                PatternSegment::Glob("hosts".to_string()),
                PatternSegment::Quoted("10.0.0.1".to_string()),
                PatternSegment::Glob("name".to_string()),
            ]
        );

        let source = json!({"hosts": {"10.0.0.1": {"name": "core"}, "10.0.0.2": {"name": "edge"}}});
        let device = json!({"hosts": {"10.0.0.1": {"name": "core-old"}, "10.0.0.2": {"name": "edge-old"}}});
        let rules = vec![SeverityRule::new(r#"hosts["10.0.0.1"].name"#, Severity::Critical)];
        let report = compare(&source, &device, &rules);

        let find = |path: &str| report.differences.iter().find(|d| d.path == path).unwrap();
        assert_eq!(find(r#"hosts["10.0.0.1"].name"#).severity, Severity::Critical);
        assert_eq!(find(r#"hosts["10.0.0.2"].name"#).severity, Severity::Info);
    }

    #[test]
    fn quoted_pattern_segment_is_literal() {
        let star = vec![Segment::Key("a*".to_string())];
        let other = vec![Segment::Key("ab".to_string())];
        assert!(glob(&pattern_segments(r#"["a*"]"#), &star));
        assert!(!glob(&pattern_segments(r#"["a*"]"#), &other));
        assert!(glob(&pattern_segments("a*"), &other));

        let quote = vec![Segment::Key(r#"say "hi""#.to_string())];
        assert!(glob(&pattern_segments(&render_path(&quote)), &quote));
        let empty = vec![Segment::Key(String::new())];
        assert!(glob(&pattern_segments(r#"[""]"#), &empty));
    }

    #[test]
    fn drift_percentage_rounding() {
        assert_eq!(drift_percentage(0, 0), 0.0);
        assert_eq!(drift_percentage(0, 10), 0.0);
        assert_eq!(drift_percentage(1, 3), 33.3);
        assert_eq!(drift_percentage(1, 5000), 0.1);
        assert_eq!(drift_percentage(7, 7), 100.0);
    }
}
