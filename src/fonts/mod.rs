pub(crate) mod afm;
mod face;
mod loader;
pub mod names;

pub use face::{FontKey, LoadedFont, StandardFont};
pub use loader::FontLoader;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use ttf_parser::{Face, name_id};

use crate::config::EngineConfig;
use crate::error::FontResolutionError;
use crate::messages::{self, DefaultMessages, MessageLookup};

/// One face discovered on disk.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceInfo {
    pub path: PathBuf,
    pub face_index: u32,
    /// First family record (name id 1).
    pub family: String,
    /// Every family, full and PostScript name the face declares.
    pub names: Vec<String>,
    pub bold: bool,
    pub italic: bool,
}

impl FaceInfo {
    pub fn new(path: impl Into<PathBuf>, family: &str, names: &[&str]) -> Self {
        let mut all = vec![family.to_string()];
        all.extend(names.iter().map(|n| n.to_string()).filter(|n| n != family));
        Self {
            path: path.into(),
            face_index: 0,
            family: family.to_string(),
            names: all,
            bold: false,
            italic: false,
        }
    }

    pub fn styled(mut self, bold: bool, italic: bool) -> Self {
        self.bold = bold;
        self.italic = italic;
        self
    }

    fn stem(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string()
    }
}

/// Which step of the resolution chain produced a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchStep {
    Exact,
    FileName,
    Alias,
    Normalized,
    Fuzzy,
    Variation,
    Substring,
    Keyword,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FontRecord {
    /// Registered name that matched.
    pub name: String,
    pub family: String,
    pub path: PathBuf,
    pub face_index: u32,
    pub bold: bool,
    pub italic: bool,
    pub step: MatchStep,
}

impl FontRecord {
    pub fn load(&self) -> Result<LoadedFont, crate::Error> {
        LoadedFont::open(&self.path, self.face_index, &self.family)
    }
}

/// Outcome of the fallback chain: a local file, or a base font.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedFont {
    Local(FontRecord),
    Standard(StandardFont),
}

/// Index of local fonts under every name they can be referred to by.
pub struct FontCatalog {
    faces: Vec<FaceInfo>,
    names: HashMap<String, usize>,
    /// (lower-cased name, face) in registration order.
    ordered: Vec<(String, usize)>,
    variations: HashMap<String, usize>,
    file_keys: HashMap<String, usize>,
    learned: RefCell<HashMap<String, usize>>,
    /// Results of the slow steps, keyed by subset-stripped source name.
    memo: RefCell<HashMap<String, FontRecord>>,
    warned: RefCell<HashSet<String>>,
    unresolved: RefCell<Vec<String>>,
    messages: Box<dyn MessageLookup>,
}

impl FontCatalog {
    pub fn scan(config: &EngineConfig) -> Self {
        Self::from_faces(scan_font_dirs(&config.font_dirs, config.use_font_cache))
    }

    /// Builds the index from already-known faces. Faces are registered
    /// regular-first so a family name is claimed by its upright cut.
    pub fn from_faces(mut faces: Vec<FaceInfo>) -> Self {
        faces.sort_by_key(|f| {
            let label = format!("{} {}", f.stem(), f.names.join(" "));
            names::priority_score(&label, f.bold, f.italic)
        });

        let mut catalog = FontCatalog {
            faces: Vec::new(),
            names: HashMap::new(),
            ordered: Vec::new(),
            variations: HashMap::new(),
            file_keys: HashMap::new(),
            learned: RefCell::new(HashMap::new()),
            memo: RefCell::new(HashMap::new()),
            warned: RefCell::new(HashSet::new()),
            unresolved: RefCell::new(Vec::new()),
            messages: Box::new(DefaultMessages),
        };
        for face in faces {
            let idx = catalog.faces.len();
            let stem = face.stem();
            let mut keys = vec![stem.clone()];
            for name in &face.names {
                keys.push(name.clone());
                keys.extend(names::spelling_variants(name));
            }
            for key in keys {
                catalog.register(key, idx);
            }
            let fk = names::file_key(&stem);
            if !fk.is_empty() {
                catalog.file_keys.entry(fk).or_insert(idx);
            }
            catalog.faces.push(face);
        }
        catalog
    }

    pub fn set_messages(&mut self, messages: Box<dyn MessageLookup>) {
        self.messages = messages;
    }

    fn register(&mut self, key: String, idx: usize) {
        if key.is_empty() || self.names.contains_key(&key) {
            return;
        }
        for v in names::variations(&key) {
            self.variations.entry(v).or_insert(idx);
        }
        self.ordered.push((key.to_lowercase(), idx));
        self.names.insert(key, idx);
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn faces(&self) -> &[FaceInfo] {
        &self.faces
    }

    /// Every registered name with the file it points at.
    pub fn registered_names(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.names
            .iter()
            .map(|(name, &idx)| (name.as_str(), self.faces[idx].path.as_path()))
    }

    /// Names that fell through every resolution step, in first-seen order.
    pub fn unresolved_names(&self) -> Vec<String> {
        self.unresolved.borrow().clone()
    }

    fn record(&self, idx: usize, name: &str, step: MatchStep) -> FontRecord {
        let face = &self.faces[idx];
        FontRecord {
            name: name.to_string(),
            family: face.family.clone(),
            path: face.path.clone(),
            face_index: face.face_index,
            bold: face.bold,
            italic: face.italic,
            step,
        }
    }

    fn lookup(&self, name: &str) -> Option<usize> {
        self.names
            .get(name)
            .copied()
            .or_else(|| self.learned.borrow().get(name).copied())
    }

    fn exact(&self, candidates: &[&str], step: MatchStep) -> Option<FontRecord> {
        let (name, idx) = candidates
            .iter()
            .find_map(|&c| self.lookup(c).map(|idx| (c, idx)))?;
        let family = &self.faces[idx].family;
        if self.lookup(family).is_none() {
            log::debug!("Learned preferred name '{}' for {}", family, name);
            self.learned.borrow_mut().insert(family.clone(), idx);
        }
        Some(self.record(idx, name, step))
    }

    /// Maps a font name as written in a source document to a local face.
    pub fn resolve(&self, source: &str) -> Result<FontRecord, FontResolutionError> {
        let source = source.trim();
        let clean = names::strip_subset_prefix(source);
        if let Some(rec) = self.exact(&[source, clean], MatchStep::Exact) {
            return Ok(rec);
        }

        if let Some(rec) = self.memo.borrow().get(clean) {
            return Ok(rec.clone());
        }
        match self.resolve_slow(clean) {
            Some(rec) => {
                self.memo.borrow_mut().insert(clean.to_string(), rec.clone());
                Ok(rec)
            }
            None => {
                self.warn_unresolved(source);
                Err(FontResolutionError {
                    name: source.to_string(),
                })
            }
        }
    }

    fn resolve_slow(&self, clean: &str) -> Option<FontRecord> {
        let norm = names::normalize(clean);
        let lower = norm.to_lowercase();
        let key = names::file_key(&norm);

        if !key.is_empty()
            && let Some(&idx) = self.file_keys.get(&key)
        {
            return Some(self.record(idx, &norm, MatchStep::FileName));
        }

        if let Some((_, family)) = names::FILENAME_ALIASES.iter().find(|(code, _)| *code == key)
            && let Some(idx) = self.lookup(family)
        {
            return Some(self.record(idx, family, MatchStep::Alias));
        }

        if let Some(rec) = self.exact(&[norm.as_str()], MatchStep::Normalized) {
            return Some(rec);
        }

        if lower.is_empty() {
            return None;
        }
        if let Some(rec) = self.fuzzy(&lower) {
            return Some(rec);
        }
        if let Some(&idx) = self.variations.get(&lower).or_else(|| self.variations.get(&key)) {
            return Some(self.record(idx, &norm, MatchStep::Variation));
        }
        if let Some((name, idx)) = self.ordered.iter().find(|(name, _)| {
            name.chars().count() >= 3 && (name.contains(&lower) || lower.contains(name.as_str()))
        }) {
            return Some(self.record(*idx, name, MatchStep::Substring));
        }
        self.keyword(&lower)
    }

    fn fuzzy(&self, lower: &str) -> Option<FontRecord> {
        let mut best: Option<(f32, usize, &str)> = None;
        for (name, idx) in &self.ordered {
            let ratio = names::similarity(lower, name);
            if ratio >= 0.3 && best.is_none_or(|(b, _, _)| ratio > b) {
                best = Some((ratio, *idx, name.as_str()));
            }
        }
        best.map(|(ratio, idx, name)| {
            log::debug!("Fuzzy font match '{}' -> '{}' ({:.2})", lower, name, ratio);
            self.record(idx, name, MatchStep::Fuzzy)
        })
    }

    fn keyword(&self, lower: &str) -> Option<FontRecord> {
        for (kw, family) in names::LOCALIZED_KEYWORDS {
            if !lower.contains(kw) {
                continue;
            }
            if let Some(idx) = self.lookup(family) {
                return Some(self.record(idx, family, MatchStep::Keyword));
            }
            if let Some((name, idx)) = self.ordered.iter().find(|(name, _)| name.contains(kw)) {
                return Some(self.record(*idx, name, MatchStep::Keyword));
            }
        }
        None
    }

    fn warn_unresolved(&self, name: &str) {
        if !self.warned.borrow_mut().insert(name.to_string()) {
            return;
        }
        self.unresolved.borrow_mut().push(name.to_string());
        log::warn!(
            "{}",
            messages::render(self.messages.as_ref(), messages::FONT_NOT_FOUND, &[("name", name)])
        );
    }

    /// Real bold/italic cut of `family`, by suffixed name first, then by the
    /// style bits of faces sharing the family name.
    pub fn resolve_variant(&self, family: &str, bold: bool, italic: bool) -> Option<FontRecord> {
        for suffix in names::variant_suffixes(bold, italic) {
            let candidate = format!("{}{}", family, suffix);
            if let Some(idx) = self.lookup(&candidate) {
                return Some(self.record(idx, &candidate, MatchStep::Exact));
            }
        }
        if !bold && !italic {
            return None;
        }
        self.faces
            .iter()
            .position(|f| f.family.eq_ignore_ascii_case(family) && f.bold == bold && f.italic == italic)
            .map(|idx| self.record(idx, family, MatchStep::Exact))
    }

    /// Resolution followed by the configured default families, then a base
    /// font.
    pub fn resolve_or_default(&self, source: &str, defaults: &[String]) -> ResolvedFont {
        if let Ok(rec) = self.resolve(source) {
            return ResolvedFont::Local(rec);
        }
        for family in defaults {
            if let Some(idx) = self.lookup(family) {
                return ResolvedFont::Local(self.record(idx, family, MatchStep::Exact));
            }
        }
        ResolvedFont::Standard(StandardFont::for_family(source))
    }
}

struct CachedFile {
    faces: Vec<FaceInfo>,
}

struct FontCache {
    dir_mtimes: HashMap<PathBuf, i64>,
    files: HashMap<PathBuf, CachedFile>,
}

impl FontCache {
    fn empty() -> Self {
        FontCache {
            dir_mtimes: HashMap::new(),
            files: HashMap::new(),
        }
    }
}

fn cache_path() -> Option<PathBuf> {
    let dir = if cfg!(target_os = "macos") {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Caches/retext-pdf"))
    } else if cfg!(target_os = "windows") {
        std::env::var("LOCALAPPDATA")
            .ok()
            .map(|d| PathBuf::from(d).join("retext-pdf/cache"))
    } else {
        std::env::var("XDG_CACHE_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".cache"))
            })
            .map(|d| d.join("retext-pdf"))
    };
    dir.map(|d| d.join("font-index.tsv"))
}

const CACHE_VERSION: &str = "v2";
const NAME_SEP: char = '\u{1f}';

fn load_cache() -> FontCache {
    let mut fc = FontCache::empty();
    let Some(path) = cache_path() else {
        return fc;
    };
    let Ok(content) = std::fs::read_to_string(&path) else {
        return fc;
    };
    let mut lines = content.lines();
    if lines.next() != Some(CACHE_VERSION) {
        return fc;
    }
    for line in lines {
        let parts: Vec<&str> = line.split('\t').collect();
        match parts.first().copied() {
            Some("D") if parts.len() == 3 => {
                let Ok(mtime) = parts[2].parse::<i64>() else {
                    continue;
                };
                fc.dir_mtimes.insert(PathBuf::from(parts[1]), mtime);
            }
            Some("F") if parts.len() == 7 => {
                let file_path = PathBuf::from(parts[1]);
                let Ok(face_index) = parts[2].parse::<u32>() else {
                    continue;
                };
                let face = FaceInfo {
                    path: file_path.clone(),
                    face_index,
                    bold: parts[3] == "1",
                    italic: parts[4] == "1",
                    family: parts[5].to_string(),
                    names: parts[6].split(NAME_SEP).map(str::to_string).collect(),
                };
                fc.files
                    .entry(file_path)
                    .or_insert(CachedFile { faces: Vec::new() })
                    .faces
                    .push(face);
            }
            Some("F") if parts.len() == 3 && parts[2] == "-" => {
                fc.files
                    .entry(PathBuf::from(parts[1]))
                    .or_insert(CachedFile { faces: Vec::new() });
            }
            _ => {}
        }
    }
    fc
}

fn save_cache(cache: &FontCache) {
    let Some(path) = cache_path() else {
        return;
    };
    if let Some(dir) = path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    let clean = |s: &str| s.replace(['\t', '\n', NAME_SEP], " ");
    let mut out = String::from(CACHE_VERSION);
    out.push('\n');
    for (dir_path, mtime) in &cache.dir_mtimes {
        out.push_str(&format!("D\t{}\t{}\n", dir_path.to_string_lossy(), mtime));
    }
    for (file_path, cached) in &cache.files {
        let path_str = file_path.to_string_lossy();
        if cached.faces.is_empty() {
            out.push_str(&format!("F\t{}\t-\n", path_str));
        }
        for face in &cached.faces {
            let joined: Vec<String> = face.names.iter().map(|n| clean(n)).collect();
            out.push_str(&format!(
                "F\t{}\t{}\t{}\t{}\t{}\t{}\n",
                path_str,
                face.face_index,
                if face.bold { "1" } else { "0" },
                if face.italic { "1" } else { "0" },
                clean(&face.family),
                joined.join(&NAME_SEP.to_string()),
            ));
        }
    }
    let _ = std::fs::write(&path, out);
}

fn dir_mtime(path: &Path) -> i64 {
    std::fs::metadata(path)
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn is_font_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("ttf" | "otf" | "ttc")
    )
}

fn is_font_collection(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("ttc"))
}

fn read_face_info(path: &Path, data: &[u8], face_index: u32) -> Option<FaceInfo> {
    let face = Face::parse(data, face_index).ok()?;
    let mut family = None;
    let mut all = Vec::new();
    for name in face.names() {
        if !matches!(
            name.name_id,
            name_id::FAMILY | name_id::FULL_NAME | name_id::POST_SCRIPT_NAME | name_id::TYPOGRAPHIC_FAMILY
        ) || !name.is_unicode()
        {
            continue;
        }
        let Some(s) = name.to_string() else {
            continue;
        };
        let s = s.trim().to_string();
        if s.is_empty() {
            continue;
        }
        if name.name_id == name_id::FAMILY && family.is_none() {
            family = Some(s.clone());
        }
        if !all.contains(&s) {
            all.push(s);
        }
    }
    let family = family
        .or_else(|| all.first().cloned())
        .or_else(|| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))?;
    Some(FaceInfo {
        path: path.to_path_buf(),
        face_index,
        family,
        names: all,
        bold: face.is_bold(),
        italic: face.is_italic(),
    })
}

/// Walks the font directories, reusing cached name tables for directories
/// whose mtime has not changed.
pub fn scan_font_dirs(dirs: &[PathBuf], use_cache: bool) -> Vec<FaceInfo> {
    let t0 = std::time::Instant::now();
    let mut found = Vec::new();
    let cache = if use_cache { load_cache() } else { FontCache::empty() };
    let mut new_cache = FontCache::empty();
    let mut files_scanned = 0u32;
    let mut dirs_cached = 0u32;
    let mut dirs_scanned = 0u32;
    let mut visited_dirs: HashSet<PathBuf> = HashSet::new();

    let mut stack: Vec<PathBuf> = dirs.iter().rev().cloned().collect();
    while let Some(dir) = stack.pop() {
        if !visited_dirs.insert(dir.clone()) {
            continue;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };

        let mut subdirs = Vec::new();
        let mut font_files = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                subdirs.push(path);
            } else if is_font_file(&path) {
                font_files.push(path);
            }
        }
        subdirs.sort();
        font_files.sort();
        stack.extend(subdirs.into_iter().rev());

        if font_files.is_empty() {
            continue;
        }

        let current_mtime = dir_mtime(&dir);
        if let Some(&cached_mtime) = cache.dir_mtimes.get(&dir)
            && cached_mtime == current_mtime
        {
            dirs_cached += 1;
            new_cache.dir_mtimes.insert(dir.clone(), current_mtime);
            for file_path in &font_files {
                if let Some(cached_file) = cache.files.get(file_path) {
                    found.extend(cached_file.faces.iter().cloned());
                    new_cache.files.insert(
                        file_path.clone(),
                        CachedFile {
                            faces: cached_file.faces.clone(),
                        },
                    );
                }
            }
            continue;
        }

        dirs_scanned += 1;
        new_cache.dir_mtimes.insert(dir, current_mtime);
        for file_path in font_files {
            files_scanned += 1;
            let Ok(file) = std::fs::File::open(&file_path) else {
                continue;
            };
            let Ok(data) = (unsafe { Mmap::map(&file) }) else {
                continue;
            };
            let face_count = if is_font_collection(&file_path) {
                ttf_parser::fonts_in_collection(&data).unwrap_or(1)
            } else {
                1
            };
            let faces: Vec<FaceInfo> = (0..face_count)
                .filter_map(|idx| read_face_info(&file_path, &data, idx))
                .collect();
            found.extend(faces.iter().cloned());
            new_cache.files.insert(file_path, CachedFile { faces });
        }
    }

    if use_cache {
        save_cache(&new_cache);
    }

    log::info!(
        "Font scan: {:.1}ms, {} dirs cached / {} scanned, {} files parsed → {} faces",
        t0.elapsed().as_secs_f64() * 1000.0,
        dirs_cached,
        dirs_scanned,
        files_scanned,
        found.len(),
    );

    found
}
