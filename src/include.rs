//! Inline `{name}` file references in user text.
//!
//! A token is resolved against a fixed list of directories below the working
//! directory and then the agent's `uploads` directory; the first regular file
//! found wins.  Resolution never fails: problems become bracketed markers in
//! the text so the model sees what went wrong.

use std::fs;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Largest file that will be inlined.
pub const MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;

/// Directories searched below the working directory, in order.
pub const SEARCH_DIRS: &[&str] = &[
    ".", "src", "lib", "scripts", "data", "documents", "files", "config", "configs",
];

const TOKEN_PATTERN: &str = r"\{([^}]+)\}";

/// Extensions (lowercase, without the dot) that may be inlined.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    // programming languages
    "py", "r", "js", "ts", "jsx", "tsx", "java", "c", "cpp", "cc", "cxx", "h", "hpp", "cs", "php",
    "rb", "go", "rs", "swift", "kt", "scala", "clj", "hs", "ml", "fs", "vb", "pl", "pm", "sh",
    "bash", "zsh", "fish", "ps1", "bat", "cmd", "sql", "html", "htm", "css", "scss", "sass",
    "less", "xml", "xsl", "xslt", "json", "yaml", "yml", "toml", "ini", "cfg", "conf",
    "properties", "env", "dockerfile", "docker", "makefile", "cmake", "gradle", "sbt", "pom",
    "lock", "mod", "sum",
    // data and markup
    "md", "markdown", "rst", "tex", "latex", "csv", "tsv", "jsonl", "ndjson", "svg", "rss", "atom",
    "plist",
    // infrastructure
    "tf", "tfvars", "hcl", "nomad", "consul", "vault", "k8s", "kubectl", "helm", "kustomize",
    "ansible", "inventory", "playbook",
    // text and logs
    "txt", "log", "out", "err", "trace", "debug", "info", "warn", "error", "readme", "license",
    "changelog", "authors", "contributors", "todo",
    // notebooks
    "ipynb", "rmd", "qmd", "jl", "m", "octave",
    // web and api
    "graphql", "gql", "rest", "http", "api", "postman", "insomnia",
    // tool configs
    "editorconfig", "gitignore", "gitattributes", "dockerignore", "eslintrc", "prettierrc",
    "babelrc", "webpack", "rollup", "vite", "parcel",
];

/// Extension-less file names (lowercase) that may be inlined.
pub const KNOWN_NAMES: &[&str] = &[
    "makefile",
    "dockerfile",
    "rakefile",
    "gemfile",
    "podfile",
    "readme",
    "license",
    "changelog",
    "authors",
    "contributors",
    "todo",
    "manifest",
    "requirements",
    "pipfile",
    "poetry",
];

////////////////////////////////////////////// decoding //////////////////////////////////////////////

type DecodeFn = fn(&[u8]) -> Option<String>;

/// Strict decoders tried in order; the first to accept the bytes wins.
const DECODERS: &[(&str, DecodeFn)] = &[
    ("utf-8", decode_utf8),
    ("utf-16", decode_utf16),
    ("windows-1252", decode_windows_1252),
];

fn decode_utf8(bytes: &[u8]) -> Option<String> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    std::str::from_utf8(bytes).ok().map(str::to_string)
}

fn decode_utf16(bytes: &[u8]) -> Option<String> {
    let (body, little_endian) = match bytes {
        [0xFF, 0xFE, rest @ ..] => (rest, true),
        [0xFE, 0xFF, rest @ ..] => (rest, false),
        _ => return None,
    };
    if body.len() % 2 != 0 {
        return None;
    }
    let units = body.chunks_exact(2).map(|pair| {
        if little_endian {
            u16::from_le_bytes([pair[0], pair[1]])
        } else {
            u16::from_be_bytes([pair[0], pair[1]])
        }
    });
    char::decode_utf16(units).collect::<std::result::Result<String, _>>().ok()
}

// 0x80..=0x9F; zero marks the five bytes Windows-1252 leaves undefined.
const WINDOWS_1252_HIGH: [u32; 32] = [
    0x20AC, 0, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021, 0x02C6, 0x2030, 0x0160, 0x2039,
    0x0152, 0, 0x017D, 0, 0, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014, 0x02DC,
    0x2122, 0x0161, 0x203A, 0x0153, 0, 0x017E, 0x0178,
];

fn decode_windows_1252(bytes: &[u8]) -> Option<String> {
    bytes
        .iter()
        .map(|&b| match b {
            0x80..=0x9F => char::from_u32(WINDOWS_1252_HIGH[(b - 0x80) as usize])
                .filter(|c| *c != '\0'),
            _ => Some(b as char),
        })
        .collect()
}

/// Decode file bytes with the first strict decoder that accepts them,
/// falling back to lossy UTF-8.
pub fn decode(name: &str, bytes: &[u8]) -> String {
    for (encoding, decoder) in DECODERS {
        if let Some(text) = decoder(bytes) {
            if *encoding != "utf-8" {
                info!("decoded {name} as {encoding}");
            }
            return text;
        }
    }
    warn!("File {name} contained non-standard encoding, some characters may be garbled");
    String::from_utf8_lossy(bytes).into_owned()
}

////////////////////////////////////////////// helpers ///////////////////////////////////////////////

/// True when `path` has a supported extension or a known extension-less name.
pub fn is_supported(path: &Path) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
            return true;
        }
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| KNOWN_NAMES.contains(&n.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// The extension with its leading dot, or the empty string.
fn dotted_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}

/// The header line announcing an inlined file, in the file's comment style.
pub fn header(name: &str, path: &Path) -> String {
    let suffix = dotted_extension(path);
    match suffix.to_lowercase().as_str() {
        ".py" | ".r" => format!("# File: {name} ({suffix})\n"),
        ".html" | ".xml" => format!("<!-- File: {name} ({suffix}) -->\n"),
        ".css" | ".scss" | ".sass" => format!("/* File: {name} ({suffix}) */\n"),
        ".sql" => format!("-- File: {name} ({suffix})\n"),
        _ => format!("// File: {name} ({suffix})\n"),
    }
}

fn human_size(size: u64) -> String {
    if size < 1024 * 1024 {
        let digits = size.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        format!("{grouped} bytes")
    } else {
        format!("{:.1} MB", size as f64 / (1024.0 * 1024.0))
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|n| n.starts_with('.') && n != "." && n != "..").unwrap_or(false)
}

//////////////////////////////////////////// FileIncluder ////////////////////////////////////////////

/// Resolves `{name}` tokens against a set of search roots.
#[derive(Debug, Clone)]
pub struct FileIncluder {
    base: PathBuf,
    roots: Vec<PathBuf>,
    pattern: Regex,
}

impl FileIncluder {
    /// Search the standard directories under `base`, then `uploads`.
    pub fn new(base: impl Into<PathBuf>, uploads: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        let mut roots: Vec<PathBuf> = SEARCH_DIRS
            .iter()
            .map(|dir| if *dir == "." { base.clone() } else { base.join(dir) })
            .collect();
        roots.push(uploads.into());
        let pattern = Regex::new(TOKEN_PATTERN).map_err(|err| {
            Error::validation(format!("invalid inclusion pattern: {err}"), None)
        })?;
        Ok(Self {
            base,
            roots,
            pattern,
        })
    }

    /// The directories searched, in order.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Replace every `{name}` token in `text` with the file's contents or a marker.
    pub fn resolve(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, |caps: &Captures<'_>| self.include(&caps[1]))
            .into_owned()
    }

    fn find(&self, name: &str) -> Option<PathBuf> {
        self.roots
            .iter()
            .map(|root| root.join(name))
            .find(|candidate| candidate.is_file())
    }

    fn include(&self, name: &str) -> String {
        let Some(path) = self.find(name) else {
            warn!("File not found: {name}");
            return format!("[ERROR: File {name} not found]");
        };
        if !is_supported(&path) {
            warn!("Unsupported file type: {name}");
            return format!("[WARNING: Unsupported file type {name}]");
        }
        match self.read(name, &path) {
            Ok(content) => content,
            Err(err) => {
                error!("Error reading file {name}: {err}");
                format!("[ERROR: Could not read {name}: {err}]")
            }
        }
    }

    fn read(&self, name: &str, path: &Path) -> std::io::Result<String> {
        if fs::metadata(path)?.len() > MAX_FILE_SIZE {
            error!("File {name} too large (>2MB)");
            return Ok(format!("[ERROR: File {name} too large (max 2MB)]"));
        }
        let bytes = fs::read(path)?;
        let content = decode(name, &bytes);
        let header = header(name, path);
        info!(
            "Included file: {name} ({} chars, {})",
            content.chars().count(),
            dotted_extension(path)
        );
        Ok(header + &content)
    }

    /// Every supported, non-hidden file below the search roots as
    /// `path (size) [.ext]`, sorted and de-duplicated.
    pub fn list_files(&self) -> Vec<String> {
        let mut files = Vec::new();
        for root in self.roots.iter().filter(|r| r.is_dir()) {
            let walker = WalkDir::new(root)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));
            for entry in walker.filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() || !is_supported(entry.path()) {
                    continue;
                }
                let Ok(metadata) = entry.metadata() else {
                    continue;
                };
                let shown = entry.path().strip_prefix(&self.base).unwrap_or(entry.path());
                files.push(format!(
                    "{} ({}) [{}]",
                    shown.display(),
                    human_size(metadata.len()),
                    dotted_extension(entry.path())
                ));
            }
        }
        files.sort();
        files.dedup();
        files
    }
}
