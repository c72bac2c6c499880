//! Python security rule catalog (spec §4.4, GLOSSARY rule-ID listing).

use crate::model::{Finding, Severity};
use crate::sanitize::LineIndex;
use crate::security::dedup_and_order;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone, Copy)]
enum Mode {
    Sanitized,
    Raw,
}

struct Rule {
    id: &'static str,
    severity: Severity,
    message: &'static str,
    mode: Mode,
    pattern: &'static str,
}

static RULES: &[Rule] = &[
    Rule { id: "py.eval.call", severity: Severity::Critical, message: "call to eval()", mode: Mode::Sanitized, pattern: r"\beval\s*\(" },
    Rule { id: "py.exec.call", severity: Severity::Critical, message: "call to exec()", mode: Mode::Sanitized, pattern: r"\bexec\s*\(" },
    Rule { id: "py.os.system", severity: Severity::Critical, message: "os.system() invoked", mode: Mode::Sanitized, pattern: r"\bos\.system\s*\(" },
    Rule { id: "py.subprocess.shell", severity: Severity::Critical, message: "subprocess invoked with shell=True", mode: Mode::Sanitized, pattern: r"shell\s*=\s*True" },
    Rule { id: "py.subprocess.cmd_str", severity: Severity::Med, message: "subprocess invoked with a single command string rather than an argv list", mode: Mode::Sanitized, pattern: r#"subprocess\.(?:run|call|Popen|check_call|check_output)\s*\(\s*['"]"# },
    Rule { id: "py.pickle.load", severity: Severity::Critical, message: "pickle.load/loads on untrusted data", mode: Mode::Sanitized, pattern: r"\bpickle\.loads?\s*\(" },
    Rule { id: "py.yaml.unsafe_load", severity: Severity::Critical, message: "yaml.load used without SafeLoader", mode: Mode::Sanitized, pattern: r"yaml\.load\s*\((?![^)]*SafeLoader)" },
    Rule { id: "py.jsonpickle.decode", severity: Severity::High, message: "jsonpickle.decode on untrusted data", mode: Mode::Sanitized, pattern: r"jsonpickle\.decode\s*\(" },
    Rule { id: "py.marshal.loads", severity: Severity::High, message: "marshal.loads on untrusted data", mode: Mode::Sanitized, pattern: r"\bmarshal\.loads\s*\(" },
    Rule { id: "py.requests.verify_false", severity: Severity::High, message: "requests call disables TLS verification", mode: Mode::Sanitized, pattern: r"verify\s*=\s*False" },
    Rule { id: "py.ssl.unverified_context", severity: Severity::High, message: "ssl._create_unverified_context used", mode: Mode::Sanitized, pattern: r"ssl\._create_unverified_context\s*\(" },
    Rule { id: "py.regex.dynamic", severity: Severity::Med, message: "re.compile called with a non-literal pattern", mode: Mode::Sanitized, pattern: r"re\.compile\s*\(\s*[A-Za-z_][\w.]*\s*\)" },
    Rule { id: "py.crypto.weak_hash", severity: Severity::High, message: "weak hash algorithm (md5/sha1) used", mode: Mode::Sanitized, pattern: r"hashlib\.(?:md5|sha1)\s*\(" },
    Rule { id: "py.random.for_tokens", severity: Severity::Med, message: "random module used where a token/secret is expected", mode: Mode::Sanitized, pattern: r"\brandom\.(?:random|randint|choice)\s*\(" },
    Rule { id: "py.jwt.decode.unsafe", severity: Severity::High, message: "jwt.decode called with verify disabled", mode: Mode::Sanitized, pattern: r"jwt\.decode\s*\([^)]*verify\s*=\s*False" },
    Rule { id: "py.jwt.none_alg", severity: Severity::Critical, message: "jwt decode allows algorithm 'none'", mode: Mode::Raw, pattern: r#"algorithms\s*=\s*\[[^\]]*['"]none['"]"# },
    Rule { id: "py.zip.extraction", severity: Severity::High, message: "zip member extracted without path sanitization", mode: Mode::Sanitized, pattern: r"\.extractall\s*\(" },
    Rule { id: "py.tempfile.insecure", severity: Severity::Med, message: "insecure temp file creation (mktemp)", mode: Mode::Sanitized, pattern: r"tempfile\.mktemp\s*\(" },
    Rule { id: "py.fs.world_perms", severity: Severity::Med, message: "file permissions grant world write/read", mode: Mode::Sanitized, pattern: r"os\.chmod\s*\([^)]*0o?[0-7]*[2367][0-7]{2}\)" },
    Rule { id: "py.fs.dotdot", severity: Severity::High, message: "filesystem path built with a `..` traversal segment", mode: Mode::Raw, pattern: r#"open\s*\([^)]*\.\.[/\\]"# },
    Rule { id: "py.ssrf.dynamic_url", severity: Severity::High, message: "requests/urlopen called with a non-literal URL", mode: Mode::Sanitized, pattern: r"(?:requests\.(?:get|post)|urllib\.request\.urlopen)\s*\(\s*[A-Za-z_][\w.]*\s*[,)]" },
    Rule { id: "py.open_redirect", severity: Severity::Med, message: "redirect target taken from request input", mode: Mode::Sanitized, pattern: r"redirect\s*\(\s*request\.(?:args|GET|POST|form)" },
    Rule { id: "py.sql.concat", severity: Severity::Critical, message: "SQL query built via string concatenation/formatting", mode: Mode::Sanitized, pattern: r#"(?:execute|executemany)\s*\(\s*(?:f['"]|['"][^'"]*['"]\s*%|['"][^'"]*['"]\s*\+)"# },
    Rule { id: "py.cookie.insecure", severity: Severity::Med, message: "session cookie missing secure/httponly flags", mode: Mode::Raw, pattern: r"SESSION_COOKIE_SECURE\s*=\s*False|SESSION_COOKIE_HTTPONLY\s*=\s*False" },
    Rule { id: "py.importlib.dynamic", severity: Severity::Med, message: "importlib.import_module called with a non-literal name", mode: Mode::Sanitized, pattern: r"importlib\.import_module\s*\(\s*[A-Za-z_][\w.]*\s*\)" },
    Rule { id: "py.django.debug_true", severity: Severity::High, message: "Django DEBUG left enabled", mode: Mode::Raw, pattern: r"^\s*DEBUG\s*=\s*True\s*$" },
    Rule { id: "py.django.allowed_hosts_any", severity: Severity::High, message: "Django ALLOWED_HOSTS wildcard", mode: Mode::Raw, pattern: r#"ALLOWED_HOSTS\s*=\s*\[\s*['"]\*['"]"# },
    Rule { id: "py.cors.wildcard", severity: Severity::Med, message: "CORS allow-origin wildcard", mode: Mode::Raw, pattern: r"CORS_ORIGIN_ALLOW_ALL\s*=\s*True|CORS_ALLOWED_ORIGINS\s*=\s*\[\s*['\x22]\*['\x22]" },
    Rule { id: "py.cors.credentialsWildcard", severity: Severity::High, message: "CORS credentials allowed alongside a wildcard origin", mode: Mode::Raw, pattern: r#"CORS_ALLOW_CREDENTIALS\s*=\s*True[\s\S]{0,120}CORS_ORIGIN_ALLOW_ALL\s*=\s*True"# },
    Rule { id: "py.urllib3.disable_warnings", severity: Severity::Low, message: "urllib3 InsecureRequestWarning suppressed", mode: Mode::Sanitized, pattern: r"disable_warnings\s*\(" },
    Rule { id: "py.secret.literal", severity: Severity::Critical, message: "hardcoded secret-looking literal", mode: Mode::Raw, pattern: r#"(?i)(?:api[_-]?key|secret|password|token)\s*=\s*['"][A-Za-z0-9_\-]{12,}['"]"# },
    Rule { id: "py.env.access", severity: Severity::Info, message: "environment variable accessed", mode: Mode::Sanitized, pattern: r"os\.environ(?:\.get)?\s*\[?\s*['\x22]?\w+" },
    Rule { id: "py.logging.secrets", severity: Severity::Med, message: "secret-looking value passed to a logger", mode: Mode::Raw, pattern: r#"log(?:ger|ging)?\.\w+\s*\([^)]*(?:token|secret|password)"# },
    Rule { id: "py.http.cleartext", severity: Severity::Med, message: "cleartext http:// URL", mode: Mode::Raw, pattern: r"http://[^\s'\"`]+" },
];

pub fn scan(file: &str, raw: &str, sanitized: &str) -> Vec<Finding> {
    let idx = LineIndex::new(sanitized);
    let raw_idx = LineIndex::new(raw);
    let mut findings = Vec::new();
    for rule in RULES {
        let (text, line_idx) = match rule.mode {
            Mode::Sanitized => (sanitized, &idx),
            Mode::Raw => (raw, &raw_idx),
        };
        let re = compiled(rule.pattern);
        findings.extend(crate::security::scan_with_regex(text, line_idx, file, rule.id, rule.severity, rule.message, &re));
    }
    dedup_and_order(findings)
}

fn compiled(pattern: &'static str) -> Regex {
    static CACHE: Lazy<Mutex<HashMap<&'static str, Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));
    let mut cache = CACHE.lock().unwrap();
    cache.entry(pattern).or_insert_with(|| Regex::new(pattern).expect("Python rule catalog regex must compile")).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_concat_detected_via_f_string() {
        let src = "cursor.execute(f\"SELECT * FROM users WHERE id = {user_id}\")\n";
        let sanitized = crate::sanitize::sanitize(src, crate::sanitize::SanitizeOptions::python());
        let findings = scan("q.py", src, &sanitized);
        assert!(findings.iter().any(|f| f.rule_id == "py.sql.concat"));
    }

    #[test]
    fn comment_text_does_not_trigger_pickle_rule() {
        let src = "# pickle.load(data) is dangerous\nx = 1\n";
        let sanitized = crate::sanitize::sanitize(src, crate::sanitize::SanitizeOptions::python());
        let findings = scan("m.py", src, &sanitized);
        assert!(findings.iter().all(|f| f.rule_id != "py.pickle.load"));
    }

    #[test]
    fn catalog_covers_representative_rule_ids() {
        let ids: Vec<&str> = RULES.iter().map(|r| r.id).collect();
        for must_have in ["py.eval.call", "py.os.system", "py.pickle.load", "py.jwt.none_alg", "py.django.debug_true"] {
            assert!(ids.contains(&must_have), "missing rule id {must_have}");
        }
    }
}
