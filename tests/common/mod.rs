#![allow(dead_code)]

use std::path::PathBuf;

use image::{Rgb, RgbImage};
use lopdf::{Document as LoDocument, Object, Stream as LoStream, dictionary};
use retext_pdf::fonts::scan_font_dirs;
use retext_pdf::{EngineConfig, FaceInfo, FontCatalog, LoadedFont, PageSource, Rect, SourceRun, StyleFlags};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Minimal PDF with `pages` Letter pages. The MediaBox sits on the page
/// tree node so pages inherit it, and every page draws one line of text
/// with a shared Helvetica resource.
pub fn sample_pdf(pages: usize) -> Vec<u8> {
    let mut doc = LoDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let mut kids = Vec::new();
    for i in 0..pages {
        let content = format!("BT /F1 12 Tf 72 700 Td (Original text {}) Tj ET", i + 1);
        let content_id = doc.add_object(LoStream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(Object::Reference(page_id));
    }
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => pages as i64,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("serialize sample pdf");
    buf
}

/// Catalog over faces that do not exist on disk: resolution works on names
/// alone and every face falls back to a base font when opened.
pub fn fake_catalog() -> FontCatalog {
    FontCatalog::from_faces(vec![
        FaceInfo::new("/fonts/Arial.ttf", "Arial", &["Arial", "ArialMT"]),
        FaceInfo::new("/fonts/Arial Bold.ttf", "Arial", &["Arial Bold", "Arial-BoldMT"]).styled(true, false),
        FaceInfo::new("/fonts/Arial Italic.ttf", "Arial", &["Arial Italic", "Arial-ItalicMT"]).styled(false, true),
        FaceInfo::new("/fonts/TimesNewRoman.ttf", "Times New Roman", &["Times New Roman", "TimesNewRomanPSMT"]),
        FaceInfo::new("/fonts/malgun.ttf", "Malgun Gothic", &["Malgun Gothic", "MalgunGothic"]),
        FaceInfo::new("/fonts/gulim.ttc", "Gulim", &["Gulim", "굴림"]),
        FaceInfo::new("/fonts/H2GTRE.TTF", "HY견고딕", &["HY견고딕", "HYGothic-Extra"]),
    ])
}

pub fn isolated_config() -> EngineConfig {
    EngineConfig::isolated()
}

/// First single-face TrueType file on this machine with real outlines,
/// if any.
pub fn system_font() -> Option<(FaceInfo, LoadedFont)> {
    let config = EngineConfig::default();
    scan_font_dirs(&config.font_dirs, false)
        .into_iter()
        .filter(|f| {
            let name = f.path.to_string_lossy().to_lowercase();
            name.ends_with(".ttf") && f.face_index == 0 && !f.bold && !f.italic
        })
        .find_map(|f| {
            let data = std::fs::read(&f.path).ok()?;
            if data.starts_with(b"ttcf") {
                return None;
            }
            table_record(&data, b"glyf")?;
            let font = LoadedFont::open(&f.path, f.face_index, &f.family).ok()?;
            (font.has_outlines() && font.advances_1000("Hello")[0] > 0.0).then_some((f, font))
        })
}

/// Position of a table's directory record in a single-face font file, with
/// the table's offset and length.
pub fn table_record(data: &[u8], tag: &[u8; 4]) -> Option<(usize, usize, usize)> {
    let be16 = |at: usize| u16::from_be_bytes([data[at], data[at + 1]]) as usize;
    let be32 = |at: usize| u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]) as usize;
    (0..be16(4)).map(|i| 12 + i * 16).find_map(|record| {
        (&data[record..record + 4] == tag).then(|| (record, be32(record + 8), be32(record + 12)))
    })
}

/// Copy of `face` written to `dir` with its OS/2 `fsType` set to `fs_type`.
pub fn font_with_fs_type(dir: &tempfile::TempDir, face: &FaceInfo, fs_type: u16) -> FaceInfo {
    let mut data = std::fs::read(&face.path).unwrap();
    let (_, os2, _) = table_record(&data, b"OS/2").expect("font has an OS/2 table");
    data[os2 + 8..os2 + 10].copy_from_slice(&fs_type.to_be_bytes());
    write_font(dir, face, &format!("fstype-{:04x}.ttf", fs_type), &data)
}

/// Copy of `face` whose `glyf` record points past the end of the file, so
/// the face still parses but has no outlines.
pub fn font_without_glyf(dir: &tempfile::TempDir, face: &FaceInfo) -> FaceInfo {
    let mut data = std::fs::read(&face.path).unwrap();
    let (record, _, _) = table_record(&data, b"glyf").expect("font has a glyf table");
    let past_end = (data.len() as u32 + 4096).to_be_bytes();
    data[record + 8..record + 12].copy_from_slice(&past_end);
    write_font(dir, face, "no-glyf.ttf", &data)
}

fn write_font(dir: &tempfile::TempDir, face: &FaceInfo, name: &str, data: &[u8]) -> FaceInfo {
    let path = dir.path().join(name);
    std::fs::write(&path, data).unwrap();
    FaceInfo {
        path,
        face_index: 0,
        ..face.clone()
    }
}

pub fn temp_output(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

pub fn run(text: &str, font: &str, size: f32, bbox: Rect) -> SourceRun {
    SourceRun {
        text: text.to_string(),
        font: font.to_string(),
        size,
        flags: StyleFlags::empty(),
        color: [0, 0, 0],
        bbox,
        baseline: None,
    }
}

/// Page source where every pixel has one colour.
pub struct UniformSource(pub [u8; 3]);

impl PageSource for UniformSource {
    fn render_region(&self, _page: usize, region: Rect, dpi: f32) -> Option<RgbImage> {
        let scale = dpi / 72.0;
        let w = (region.width() * scale).ceil().max(1.0) as u32;
        let h = (region.height() * scale).ceil().max(1.0) as u32;
        Some(RgbImage::from_pixel(w, h, Rgb(self.0)))
    }
}

/// Page source that paints `inner` inside `rect` and `outer` elsewhere,
/// one pixel per point.
pub struct FramedSource {
    pub rect: Rect,
    pub inner: [u8; 3],
    pub outer: [u8; 3],
}

impl PageSource for FramedSource {
    fn render_region(&self, _page: usize, region: Rect, dpi: f32) -> Option<RgbImage> {
        let scale = dpi / 72.0;
        let w = (region.width() * scale).ceil().max(1.0) as u32;
        let h = (region.height() * scale).ceil().max(1.0) as u32;
        Some(RgbImage::from_fn(w, h, |x, y| {
            let p = retext_pdf::Point::new(
                region.x0 + (x as f32 + 0.5) / scale,
                region.y0 + (y as f32 + 0.5) / scale,
            );
            if self.rect.contains(p) {
                Rgb(self.inner)
            } else {
                Rgb(self.outer)
            }
        }))
    }
}
