//! Grammar-free structure metrics.
//!
//! These never fail a mutation. The integrity validator compares them before
//! and after and reports regressions as warnings.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static EMPTY_BRACE_BODY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\)\s*(?:->\s*[^{};]+)?\{\s*\}").expect("static regex"));

static PLACEHOLDER_BRACE_BODY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\s*(?:todo!\(\s*\)|unimplemented!\(\s*\)|pass|\.\.\.)\s*;?\s*\}")
        .expect("static regex")
});

static PY_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:async\s+)?(def|class)\s+\w+.*:\s*(?:#.*)?$").expect("static regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructureMetrics {
    /// Lines mixing tabs and spaces, or off the dominant indentation unit.
    pub indentation_issues: usize,
    pub empty_bodies: usize,
    pub placeholder_bodies: usize,
    pub classes_without_initializer: usize,
}

impl StructureMetrics {
    pub fn measure(source: &str) -> Self {
        let lines: Vec<&str> = source.lines().collect();
        let mut metrics = Self {
            indentation_issues: indentation_issues(&lines),
            empty_bodies: EMPTY_BRACE_BODY.find_iter(source).count(),
            placeholder_bodies: PLACEHOLDER_BRACE_BODY.find_iter(source).count(),
            classes_without_initializer: 0,
        };
        measure_indented_blocks(&lines, &mut metrics);
        metrics
    }

    /// Human-readable descriptions of every category that got worse.
    pub fn regressions(&self, baseline: &StructureMetrics) -> Vec<String> {
        let mut out = Vec::new();
        let categories = [
            ("indentation issues", baseline.indentation_issues, self.indentation_issues),
            ("empty bodies", baseline.empty_bodies, self.empty_bodies),
            ("placeholder-only bodies", baseline.placeholder_bodies, self.placeholder_bodies),
            (
                "classes with methods but no initializer",
                baseline.classes_without_initializer,
                self.classes_without_initializer,
            ),
        ];
        for (label, before, after) in categories {
            if after > before {
                out.push(format!("{label} increased from {before} to {after}"));
            }
        }
        out
    }
}

fn leading_ws(line: &str) -> &str {
    &line[..line.len() - line.trim_start_matches([' ', '\t']).len()]
}

fn indent_width(line: &str) -> usize {
    leading_ws(line)
        .chars()
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn indentation_issues(lines: &[&str]) -> usize {
    let nonblank: Vec<&str> = lines.iter().copied().filter(|l| !l.trim().is_empty()).collect();

    let mixed = nonblank
        .iter()
        .filter(|l| {
            let ws = leading_ws(l);
            ws.contains('\t') && ws.contains(' ')
        })
        .count();

    // Dominant unit: the most common positive step between consecutive
    // space-indented lines.
    let mut steps = std::collections::HashMap::<usize, usize>::new();
    for pair in nonblank.windows(2) {
        if leading_ws(pair[0]).contains('\t') || leading_ws(pair[1]).contains('\t') {
            continue;
        }
        let (a, b) = (indent_width(pair[0]), indent_width(pair[1]));
        if b > a {
            *steps.entry(b - a).or_default() += 1;
        }
    }
    let unit = steps
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map_or(0, |(step, _)| step);

    let off_unit = if unit > 1 {
        nonblank
            .iter()
            .filter(|l| !leading_ws(l).contains('\t'))
            .filter(|l| !l.trim_start().starts_with('*'))
            .filter(|l| indent_width(l) % unit != 0)
            .count()
    } else {
        0
    };

    mixed + off_unit
}

fn is_placeholder(line: &str) -> bool {
    let t = line.trim();
    t == "pass"
        || t == "..."
        || t.starts_with("raise NotImplementedError")
        || t == "todo!()"
        || t == "unimplemented!()"
}

/// Python-style `def`/`class` headers whose body is defined by indentation.
fn measure_indented_blocks(lines: &[&str], metrics: &mut StructureMetrics) {
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        let Some(caps) = PY_HEADER.captures(trimmed) else {
            continue;
        };
        let depth = indent_width(line);
        let body: Vec<&str> = lines[i + 1..]
            .iter()
            .copied()
            .filter(|l| !l.trim().is_empty())
            .take_while(|l| indent_width(l) > depth)
            .collect();

        let statements: Vec<&str> = body
            .iter()
            .copied()
            .filter(|l| !l.trim_start().starts_with('#'))
            .collect();

        if statements.is_empty() {
            metrics.empty_bodies += 1;
            continue;
        }
        let body_depth = indent_width(statements[0]);
        let top_level: Vec<&str> = statements
            .iter()
            .copied()
            .filter(|l| indent_width(l) == body_depth)
            .collect();

        if top_level.iter().all(|l| is_placeholder(l) || is_docstring(l)) {
            metrics.placeholder_bodies += 1;
        }

        if &caps[1] == "class" {
            let methods: Vec<&str> = top_level
                .iter()
                .map(|l| l.trim_start())
                .filter(|l| l.starts_with("def ") || l.starts_with("async def "))
                .collect();
            if !methods.is_empty() && !methods.iter().any(|m| m.contains("def __init__")) {
                metrics.classes_without_initializer += 1;
            }
        }
    }
}

fn is_docstring(line: &str) -> bool {
    let t = line.trim();
    (t.starts_with("\"\"\"") || t.starts_with("'''")) && t.len() >= 6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_python_has_no_issues() {
        let src = "class A:\n    def __init__(self):\n        self.x = 1\n\n    def get(self):\n        return self.x\n";
        assert_eq!(StructureMetrics::measure(src), StructureMetrics::default());
    }

    #[test]
    fn detects_placeholder_and_missing_initializer() {
        let src = "class A:\n    def run(self):\n        pass\n";
        let m = StructureMetrics::measure(src);
        assert_eq!(m.placeholder_bodies, 1);
        assert_eq!(m.classes_without_initializer, 1);
    }

    #[test]
    fn detects_brace_bodies() {
        let src = "fn a() {}\nfn b() -> u8 { todo!() }\nfn c() { 1 }\n";
        let m = StructureMetrics::measure(src);
        assert_eq!(m.empty_bodies, 1);
        assert_eq!(m.placeholder_bodies, 1);
    }

    #[test]
    fn detects_mixed_and_off_unit_indentation() {
        let src = "def f():\n    a = 1\n    if a:\n        b = 2\n      c = 3\n \td = 4\n";
        let m = StructureMetrics::measure(src);
        assert_eq!(m.indentation_issues, 2);
    }

    #[test]
    fn regressions_only_report_increases() {
        let before = StructureMetrics {
            empty_bodies: 2,
            ..Default::default()
        };
        let after = StructureMetrics {
            empty_bodies: 1,
            placeholder_bodies: 1,
            ..Default::default()
        };
        let warnings = after.regressions(&before);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("placeholder-only bodies"));
    }
}
