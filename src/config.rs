use std::path::PathBuf;

/// Thresholds for sampling the page background around an edited run.
#[derive(Debug, Clone)]
pub struct BackgroundSampling {
    /// Share of weighted pixels the dominant colour must reach.
    pub min_share: f32,
    /// Raw pixel count the dominant colour must reach.
    pub min_pixels: usize,
    pub dpi: f32,
    /// Pixels darker than this mean brightness are glyph ink.
    pub dark_cutoff: u8,
    /// Pixels brighter than this are treated as paper.
    pub light_cutoff: u8,
}

impl Default for BackgroundSampling {
    fn default() -> Self {
        Self {
            min_share: 0.40,
            min_pixels: 5,
            dpi: 150.0,
            dark_cutoff: 10,
            light_cutoff: 245,
        }
    }
}

/// Engine-wide settings. `Default` gives the values the editor ships with;
/// `from_env` layers the `RETEXT_*` environment variables on top.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub font_dirs: Vec<PathBuf>,
    pub use_font_cache: bool,
    /// Families tried, in order, when a source font cannot be resolved.
    pub default_families: Vec<String>,
    pub history_depth: usize,
    /// Space advance multiplier in HWP space mode.
    pub hwp_space_factor: f32,
    pub background: BackgroundSampling,
    /// Measurement units per point in the preview, independent of zoom.
    pub preview_precision: f32,
    /// Measurement units per point in the flatten writer.
    pub flatten_precision: f32,
    pub synthetic_bold_step: f32,
    pub synthetic_bold_spread: f32,
    /// Horizontal shear used for synthetic italic (tan 12°).
    pub synthetic_italic_skew: f32,
    pub raster_fallback_dpi: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            font_dirs: platform_font_dirs(),
            use_font_cache: true,
            default_families: ["Arial", "Helvetica", "Liberation Sans", "DejaVu Sans", "Dotum", "Gulim"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            history_depth: 50,
            hwp_space_factor: 1.5,
            background: BackgroundSampling::default(),
            preview_precision: 1000.0,
            flatten_precision: 1000.0,
            synthetic_bold_step: 0.05,
            synthetic_bold_spread: 0.15,
            synthetic_italic_skew: 0.2126,
            raster_fallback_dpi: 288.0,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = std::env::var("RETEXT_FONTS") {
            let sep = if cfg!(windows) { ';' } else { ':' };
            let extra: Vec<PathBuf> = val
                .split(sep)
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
            config.font_dirs.splice(0..0, extra);
        }
        if std::env::var("RETEXT_NO_FONT_CACHE").is_ok() {
            config.use_font_cache = false;
        }
        if let Some(depth) = std::env::var("RETEXT_HISTORY_DEPTH")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&d| d > 0)
        {
            config.history_depth = depth;
        }
        config
    }

    /// Config with no font directories, for building catalogs by hand.
    pub fn isolated() -> Self {
        Self {
            font_dirs: Vec::new(),
            use_font_cache: false,
            ..Self::default()
        }
    }
}

fn platform_font_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();

    #[cfg(target_os = "macos")]
    {
        dirs.extend([
            "/Library/Fonts".into(),
            "/System/Library/Fonts".into(),
            "/System/Library/Fonts/Supplemental".into(),
        ]);
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.extend(["/usr/share/fonts".into(), "/usr/local/share/fonts".into()]);
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(&home).join(".local/share/fonts"));
            dirs.push(PathBuf::from(home).join(".fonts"));
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(windir) = std::env::var("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        } else {
            dirs.push("C:\\Windows\\Fonts".into());
        }
        // Per-user installs land here since Windows 10 1809.
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            dirs.push(PathBuf::from(local).join("Microsoft\\Windows\\Fonts"));
        }
    }

    dirs
}
