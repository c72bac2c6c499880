//! JS/TS security rule catalog (spec §4.4, GLOSSARY rule-ID listing). Three
//! rule classes: sanitized (run against the sanitizer's output so comments
//! and string contents can't trigger a false match), raw (run against raw
//! text because the rule's intent includes string/header literal content),
//! and heuristic (context-sensitive, inspecting a line plus a short window).

use crate::model::{Finding, Severity};
use crate::sanitize::LineIndex;
use crate::security::dedup_and_order;
use once_cell::sync::Lazy;
use regex::Regex;

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

/// Closed catalog. Declaration order is the catalog's emission tie-break
/// order (spec §4.4).
static RULES: &[Rule] = &[
    Rule { id: "eval.call", severity: Severity::Critical, message: "call to eval()", mode: Mode::Sanitized, pattern: r"\beval\s*\(" },
    Rule { id: "function.constructor", severity: Severity::High, message: "Function constructor used to build code from a string", mode: Mode::Sanitized, pattern: r"\bnew\s+Function\s*\(" },
    Rule { id: "timeout.string", severity: Severity::High, message: "setTimeout/setInterval called with a string body", mode: Mode::Raw, pattern: r#"\bset(?:Timeout|Interval)\s*\(\s*['"]"# },
    Rule { id: "vm.module", severity: Severity::High, message: "Node vm module used to run dynamic code", mode: Mode::Sanitized, pattern: r#"require\(\s*['"]vm['"]\s*\)|\bvm\.(?:runInNewContext|runInThisContext|Script)\s*\("# },
    Rule { id: "child_process.exec", severity: Severity::Critical, message: "child_process.exec invoked", mode: Mode::Sanitized, pattern: r"\bchild_process\.exec\s*\(|\bexec\s*\(" },
    Rule { id: "child_process.shell", severity: Severity::Critical, message: "child process spawned with shell: true", mode: Mode::Sanitized, pattern: r"\bshell\s*:\s*true\b" },
    Rule { id: "child_process.spawnShell", severity: Severity::High, message: "spawn/execFile with shell option", mode: Mode::Sanitized, pattern: r"\b(?:spawn|execFile)\s*\([^)]*shell" },
    Rule { id: "child_process.userArgs", severity: Severity::High, message: "child process arguments built from user input", mode: Mode::Sanitized, pattern: r"\b(?:exec|spawn)\s*\([^)]*req\.(?:body|query|params)" },
    Rule { id: "dynamic.require", severity: Severity::Med, message: "require() called with a non-literal argument", mode: Mode::Sanitized, pattern: r"\brequire\s*\(\s*[A-Za-z_$][\w$.]*\s*\)" },
    Rule { id: "dynamic.import", severity: Severity::Med, message: "dynamic import() called with a non-literal argument", mode: Mode::Sanitized, pattern: r"\bimport\s*\(\s*[A-Za-z_$][\w$.]*\s*\)" },
    Rule { id: "import.template", severity: Severity::Med, message: "import/require built from a template literal", mode: Mode::Raw, pattern: r"(?:require|import)\s*\(\s*`[^`]*\$\{" },
    Rule { id: "node.builtin", severity: Severity::Info, message: "sensitive Node builtin module required", mode: Mode::Sanitized, pattern: r#"require\(\s*['"](?:fs|child_process|net|tls|dgram|cluster)['"]\s*\)"# },
    Rule { id: "process.env", severity: Severity::Info, message: "process.env accessed", mode: Mode::Sanitized, pattern: r"\bprocess\.env\.\w+" },
    Rule { id: "fs.access", severity: Severity::Info, message: "filesystem access", mode: Mode::Sanitized, pattern: r"\bfs\.(?:readFile|writeFile|unlink|rm|readdir)Sync?\s*\(" },
    Rule { id: "fs.dotdot", severity: Severity::High, message: "filesystem path built with a `..` traversal segment", mode: Mode::Raw, pattern: r#"fs\.\w+\s*\([^)]*\.\.[/\\]"# },
    Rule { id: "http.cleartext", severity: Severity::Med, message: "cleartext http:// URL", mode: Mode::Raw, pattern: r"http://[^\s'\"`]+" },
    Rule { id: "dom.innerHTML", severity: Severity::High, message: "assignment to innerHTML", mode: Mode::Sanitized, pattern: r"\.innerHTML\s*=" },
    Rule { id: "dom.outerHTML", severity: Severity::High, message: "assignment to outerHTML", mode: Mode::Sanitized, pattern: r"\.outerHTML\s*=" },
    Rule { id: "document.write", severity: Severity::High, message: "document.write/writeln call", mode: Mode::Sanitized, pattern: r"\bdocument\.writeln?\s*\(" },
    Rule { id: "dom.insertAdjacentHTML", severity: Severity::High, message: "insertAdjacentHTML call", mode: Mode::Sanitized, pattern: r"\.insertAdjacentHTML\s*\(" },
    Rule { id: "dom.javascriptHref", severity: Severity::Med, message: "javascript: URL assigned to href", mode: Mode::Raw, pattern: r#"href\s*=\s*['"]javascript:"# },
    Rule { id: "dom.javascriptLocation", severity: Severity::Med, message: "location assigned a javascript: URL", mode: Mode::Raw, pattern: r#"location(?:\.href)?\s*=\s*['"]javascript:"# },
    Rule { id: "dom.range", severity: Severity::Med, message: "Range.createContextualFragment used with untrusted HTML", mode: Mode::Sanitized, pattern: r"\.createContextualFragment\s*\(" },
    Rule { id: "react.dangerousHTML", severity: Severity::High, message: "dangerouslySetInnerHTML used", mode: Mode::Sanitized, pattern: r"dangerouslySetInnerHTML" },
    Rule { id: "iframe.srcdoc", severity: Severity::Med, message: "iframe srcdoc assigned dynamically", mode: Mode::Sanitized, pattern: r"\bsrcdoc\s*=" },
    Rule { id: "template.interpolation", severity: Severity::Low, message: "template literal interpolation in a query/markup context", mode: Mode::Sanitized, pattern: r"`[^`]*\$\{[^}]*\}[^`]*`" },
    Rule { id: "template.tripleStache", severity: Severity::Med, message: "triple-mustache template output (unescaped)", mode: Mode::Sanitized, pattern: r"\{\{\{[^}]+\}\}\}" },
    Rule { id: "template.escapeDisabled", severity: Severity::Med, message: "template engine autoescape explicitly disabled", mode: Mode::Sanitized, pattern: r"escapeMarkup\s*:\s*false|autoescape\s*:\s*false" },
    Rule { id: "postmessage.wildcard", severity: Severity::Med, message: "postMessage with a wildcard target origin", mode: Mode::Raw, pattern: r#"postMessage\s*\([^)]*,\s*['"]\*['"]"# },
    Rule { id: "secret.literal", severity: Severity::Critical, message: "hardcoded secret-looking literal", mode: Mode::Raw, pattern: r#"(?i)(?:api[_-]?key|secret|password|token)\s*[:=]\s*['"][A-Za-z0-9_\-]{12,}['"]"# },
    Rule { id: "math.random", severity: Severity::Med, message: "Math.random used where a token/id is expected", mode: Mode::Sanitized, pattern: r"\bMath\.random\s*\(\s*\)" },
    Rule { id: "storage.token", severity: Severity::Med, message: "token-looking value read from localStorage/sessionStorage", mode: Mode::Sanitized, pattern: r"(?:localStorage|sessionStorage)\.getItem\s*\(\s*['\x22][^'\x22]*(?:token|secret)" },
    Rule { id: "storage.token.assignment", severity: Severity::Med, message: "token-looking value written to localStorage/sessionStorage", mode: Mode::Raw, pattern: r#"(?:localStorage|sessionStorage)\.setItem\s*\(\s*['"][^'"]*(?:token|secret)"# },
    Rule { id: "crypto.weakHash", severity: Severity::High, message: "weak hash algorithm (md5/sha1) used", mode: Mode::Sanitized, pattern: r#"createHash\s*\(\s*['"](?:md5|sha1)['"]"# },
    Rule { id: "crypto.createCipher", severity: Severity::High, message: "deprecated crypto.createCipher used", mode: Mode::Sanitized, pattern: r"\bcrypto\.createCipher\s*\(" },
    Rule { id: "crypto.staticIv", severity: Severity::High, message: "cipher initialization vector looks static/hardcoded", mode: Mode::Sanitized, pattern: r#"createCipheriv\s*\([^,]+,[^,]+,\s*['"]"# },
    Rule { id: "crypto.aesEcb", severity: Severity::High, message: "AES used in ECB mode", mode: Mode::Sanitized, pattern: r#"aes-\d+-ecb"# },
    Rule { id: "jwt.verify", severity: Severity::Med, message: "jwt.verify call", mode: Mode::Sanitized, pattern: r"\bjwt\.verify\s*\(" },
    Rule { id: "jwt.verify.missingOptions", severity: Severity::High, message: "jwt.verify called with no options object", mode: Mode::Sanitized, pattern: r"\bjwt\.verify\s*\([^,]+,[^,]+\)\s*[;,)]" },
    Rule { id: "jwt.verify.algorithms.missing", severity: Severity::High, message: "jwt.verify options missing an algorithms allow-list", mode: Mode::Sanitized, pattern: r"jwt\.verify\s*\([^)]*\{(?:(?!algorithms)[^}])*\}\s*\)" },
    Rule { id: "jwt.verify.algorithms.none", severity: Severity::Critical, message: "jwt.verify allows algorithm 'none'", mode: Mode::Raw, pattern: r#"algorithms\s*:\s*\[[^\]]*['"]none['"]"# },
    Rule { id: "jwt.verify.missingAud", severity: Severity::Med, message: "jwt.verify options missing audience check", mode: Mode::Sanitized, pattern: r"jwt\.verify\s*\([^)]*\{(?:(?!audience)[^}])*\}\s*\)" },
    Rule { id: "jwt.verify.missingIss", severity: Severity::Med, message: "jwt.verify options missing issuer check", mode: Mode::Sanitized, pattern: r"jwt\.verify\s*\([^)]*\{(?:(?!issuer)[^}])*\}\s*\)" },
    Rule { id: "jwt.verify.missingExp", severity: Severity::Med, message: "jwt.verify options ignore expiration", mode: Mode::Sanitized, pattern: r"ignoreExpiration\s*:\s*true" },
    Rule { id: "jwt.verify.missingNbf", severity: Severity::Med, message: "jwt.verify options ignore not-before", mode: Mode::Sanitized, pattern: r"ignoreNotBefore\s*:\s*true" },
    Rule { id: "cors.wildcard", severity: Severity::Med, message: "CORS allow-origin wildcard", mode: Mode::Raw, pattern: r#"Access-Control-Allow-Origin['"]?\s*[:,]\s*['"]\*['"]"# },
    Rule { id: "cors.middleware", severity: Severity::Med, message: "cors() middleware enabled with a wildcard origin", mode: Mode::Raw, pattern: r#"cors\s*\(\s*\{\s*origin\s*:\s*['"]\*['"]"# },
    Rule { id: "cors.credentialsWildcard", severity: Severity::High, message: "CORS credentials allowed alongside a wildcard origin", mode: Mode::Raw, pattern: r#"credentials\s*:\s*true[\s\S]{0,80}origin\s*:\s*['"]\*['"]"# },
    Rule { id: "cookie.literal", severity: Severity::Low, message: "cookie value set from a literal", mode: Mode::Raw, pattern: r#"document\.cookie\s*=\s*['"]"# },
    Rule { id: "cookie.sameSiteNoneInsecure", severity: Severity::High, message: "SameSite=None cookie without Secure", mode: Mode::Raw, pattern: r#"SameSite\s*=\s*['"]?None['"]?(?![\s\S]{0,40}Secure)"# },
    Rule { id: "cookie.session.noHttpOnly", severity: Severity::Med, message: "session cookie missing httpOnly", mode: Mode::Raw, pattern: r"httpOnly\s*:\s*false" },
    Rule { id: "console.secret", severity: Severity::Med, message: "secret-looking value logged to console", mode: Mode::Raw, pattern: r#"console\.(?:log|debug|info)\s*\([^)]*(?:token|secret|password)"# },
    Rule { id: "import.meta.env", severity: Severity::Info, message: "import.meta.env accessed", mode: Mode::Sanitized, pattern: r"import\.meta\.env\.\w+" },
    Rule { id: "ssrf.metadataHost", severity: Severity::Critical, message: "request to a cloud metadata host", mode: Mode::Raw, pattern: r"169\.254\.169\.254" },
    Rule { id: "ssrf.dynamicFetch", severity: Severity::High, message: "fetch() called with a non-literal URL", mode: Mode::Sanitized, pattern: r"\bfetch\s*\(\s*[A-Za-z_$][\w$.]*" },
    Rule { id: "ssrf.dynamicAxios", severity: Severity::High, message: "axios called with a non-literal URL", mode: Mode::Sanitized, pattern: r"\baxios(?:\.get|\.post)?\s*\(\s*[A-Za-z_$][\w$.]*" },
    Rule { id: "ssrf.dynamicRequest", severity: Severity::High, message: "request() called with a non-literal URL", mode: Mode::Sanitized, pattern: r"\brequest\s*\(\s*\{\s*url\s*:\s*[A-Za-z_$][\w$.]*" },
    Rule { id: "injection.sqlTemplate", severity: Severity::Critical, message: "SQL query built from a template literal", mode: Mode::Raw, pattern: r"`[^`]*(?:SELECT|INSERT|UPDATE|DELETE)[^`]*\$\{" },
    Rule { id: "injection.sqlConcat", severity: Severity::High, message: "SQL query built with string concatenation", mode: Mode::Sanitized, pattern: r#"(?:SELECT|INSERT|UPDATE|DELETE)[^;]*['"]\s*\+\s*\w"# },
    Rule { id: "injection.mongoOperator", severity: Severity::High, message: "user input used as a raw Mongo operator", mode: Mode::Sanitized, pattern: r"\$where\s*:\s*[A-Za-z_$][\w$.]*" },
    Rule { id: "regex.dynamic", severity: Severity::Med, message: "RegExp constructed from a non-literal", mode: Mode::Sanitized, pattern: r"new\s+RegExp\s*\(\s*[A-Za-z_$][\w$.]*" },
    Rule { id: "regex.catastrophic", severity: Severity::High, message: "regex pattern with nested quantifiers (ReDoS-prone)", mode: Mode::Sanitized, pattern: r"\([^()]*[+*]\)[+*]" },
    Rule { id: "prototype.mergeUserInput", severity: Severity::High, message: "deep-merge called with user input, risking prototype pollution", mode: Mode::Sanitized, pattern: r"merge\s*\(\s*\{\},\s*req\.(?:body|query)" },
    Rule { id: "prototype.assignUserInput", severity: Severity::Med, message: "Object.assign target populated from user input", mode: Mode::Sanitized, pattern: r"Object\.assign\s*\([^,]+,\s*req\.(?:body|query)" },
    Rule { id: "prototype.proto", severity: Severity::High, message: "__proto__ accessed or assigned", mode: Mode::Sanitized, pattern: r"__proto__" },
    Rule { id: "path.join.userInput", severity: Severity::Med, message: "path.join called with user-controlled input", mode: Mode::Sanitized, pattern: r"path\.join\s*\([^)]*req\.(?:body|query|params)" },
    Rule { id: "zipSlip.entryPath", severity: Severity::High, message: "zip entry path used to build a filesystem path without sanitization", mode: Mode::Sanitized, pattern: r"entry\.(?:path|fileName)\s*[;,)]" },
    Rule { id: "open_redirect.clientLocation", severity: Severity::Med, message: "client-side redirect built from a URL parameter", mode: Mode::Sanitized, pattern: r"location\.href\s*=\s*(?:req\.query|params\.get)" },
    Rule { id: "open_redirect.serverRedirect", severity: Severity::Med, message: "server redirect target taken from user input", mode: Mode::Sanitized, pattern: r"res\.redirect\s*\(\s*req\.(?:query|body|params)" },
    Rule { id: "upload.trustsClientMime", severity: Severity::Med, message: "upload handler trusts the client-supplied mime type", mode: Mode::Sanitized, pattern: r"file\.mimetype" },
    Rule { id: "upload.publicWrite", severity: Severity::Med, message: "uploaded file written directly under a public directory", mode: Mode::Sanitized, pattern: r#"path\.join\s*\(\s*['"]public"# },
    Rule { id: "csrf.credentialsMissingToken", severity: Severity::Med, message: "credentialed request missing a CSRF token header", mode: Mode::Sanitized, pattern: r"credentials\s*:\s*['\x22]include['\x22]" },
    Rule { id: "headers.securityBaseline", severity: Severity::Low, message: "response missing a baseline security header", mode: Mode::Raw, pattern: r"X-Content-Type-Options" },
    Rule { id: "yaml.load.unsafe", severity: Severity::Critical, message: "yaml.load used instead of yaml.safeLoad", mode: Mode::Sanitized, pattern: r"yaml\.load\s*\(" },
    Rule { id: "xml.externalEntities", severity: Severity::Critical, message: "XML parser allows external entities", mode: Mode::Sanitized, pattern: r"noent\s*:\s*true|resolveExternalEntities" },
    Rule { id: "tls.disabledEnv", severity: Severity::Critical, message: "NODE_TLS_REJECT_UNAUTHORIZED disabled", mode: Mode::Raw, pattern: r#"NODE_TLS_REJECT_UNAUTHORIZED\s*=\s*['"]?0"# },
    Rule { id: "tls.agentInsecure", severity: Severity::High, message: "https agent created with rejectUnauthorized: false", mode: Mode::Sanitized, pattern: r"rejectUnauthorized\s*:\s*false" },
];

/// Evaluates the closed catalog over one file's sanitized/raw text.
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
    findings.extend(heuristic_findings(file, raw, sanitized, &idx));
    dedup_and_order(findings)
}

fn compiled(pattern: &'static str) -> Regex {
    static CACHE: Lazy<std::sync::Mutex<std::collections::HashMap<&'static str, Regex>>> = Lazy::new(|| std::sync::Mutex::new(std::collections::HashMap::new()));
    let mut cache = CACHE.lock().unwrap();
    cache.entry(pattern).or_insert_with(|| Regex::new(pattern).expect("JS rule catalog regex must compile")).clone()
}

static FETCH_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bfetch\s*\(").unwrap());
static REQ_BODY: Lazy<Regex> = Lazy::new(|| Regex::new(r"req\.body").unwrap());
static AUTH_BEARER: Lazy<Regex> = Lazy::new(|| Regex::new(r#"Authorization['"]?\s*:\s*['"`]?Bearer"#).unwrap());
static CREDENTIALS_INCLUDE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"credentials\s*:\s*['"]include['"]"#).unwrap());

/// Context-window heuristics: co-occurring markers within a small line
/// window around the primary match (spec §4.4).
fn heuristic_findings(file: &str, _raw: &str, sanitized: &str, idx: &LineIndex) -> Vec<Finding> {
    let mut out = Vec::new();
    let lines: Vec<&str> = sanitized.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if FETCH_LINE.is_match(line) {
            let window = lines[i.saturating_sub(2)..(i + 3).min(lines.len())].join("\n");
            if REQ_BODY.is_match(&window) {
                let offset: usize = lines[..i].iter().map(|l| l.len() + 1).sum();
                out.push(Finding {
                    rule_id: "ssrf.dynamicFetch".to_string(),
                    severity: Severity::High,
                    message: "fetch() target influenced by req.body in surrounding context".to_string(),
                    file: file.to_string(),
                    line: idx.line_at(offset),
                    column: Some(1),
                    snippet: line.trim().chars().take(200).collect(),
                    code: None,
                    start_offset: offset,
                    end_offset: offset + line.len(),
                });
            }
        }
        if AUTH_BEARER.is_match(line) {
            let window = lines[i.saturating_sub(1)..(i + 2).min(lines.len())].join("\n");
            if CREDENTIALS_INCLUDE.is_match(&window) {
                let offset: usize = lines[..i].iter().map(|l| l.len() + 1).sum();
                out.push(Finding {
                    rule_id: "csrf.credentialsMissingToken".to_string(),
                    severity: Severity::Med,
                    message: "Bearer auth combined with credentials: include and no visible CSRF token".to_string(),
                    file: file.to_string(),
                    line: idx.line_at(offset),
                    column: Some(1),
                    snippet: line.trim().chars().take(200).collect(),
                    code: None,
                    start_offset: offset,
                    end_offset: offset + line.len(),
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s4_sanitizer_suppresses_comment_and_string_matches() {
        let src = "// eval(\"bad\")\n\"eval('str')\"\neval(userInput);\n";
        let sanitized = crate::sanitize::sanitize(src, crate::sanitize::SanitizeOptions::c_like());
        let findings = scan("x.js", src, &sanitized);
        let eval_findings: Vec<_> = findings.iter().filter(|f| f.rule_id == "eval.call").collect();
        assert_eq!(eval_findings.len(), 1);
        assert_eq!(eval_findings[0].line, 3);
    }

    #[test]
    fn catalog_covers_representative_rule_ids() {
        let ids: Vec<&str> = RULES.iter().map(|r| r.id).collect();
        for must_have in ["eval.call", "child_process.exec", "jwt.verify", "cors.wildcard", "crypto.aesEcb", "tls.agentInsecure"] {
            assert!(ids.contains(&must_have), "missing rule id {must_have}");
        }
    }
}
