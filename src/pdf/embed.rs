use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};

use lopdf::{Object, ObjectId, dictionary};
use pdf_writer::Name;
use ttf_parser::{Face, Permissions};

use super::document::PdfDocument;
use crate::error::Error;
use crate::fonts::{FontKey, LoadedFont, StandardFont, afm};

/// How text for an embedded font is turned into string bytes.
#[derive(Clone, Debug)]
pub(crate) enum TextEncoding {
    /// Identity-H: two big-endian bytes per glyph id.
    Cid(HashMap<char, u16>),
    WinAnsi,
}

#[derive(Clone, Debug)]
pub(crate) struct EmbeddedFont {
    pub(crate) resource: String,
    pub(crate) id: ObjectId,
    pub(crate) encoding: TextEncoding,
}

impl EmbeddedFont {
    pub(crate) fn encode(&self, text: &str) -> Vec<u8> {
        match &self.encoding {
            TextEncoding::Cid(map) => encode_as_gids(text, map),
            TextEncoding::WinAnsi => to_winansi_bytes(text),
        }
    }
}

/// One WinAnsi code per char, `?` for anything the encoding lacks.
pub(crate) fn to_winansi_bytes(s: &str) -> Vec<u8> {
    s.chars().map(afm::winansi_or_question).collect()
}

/// Big-endian 2-byte glyph ids for a CIDFont content stream. Chars without a
/// glyph map to `.notdef`.
pub(crate) fn encode_as_gids(text: &str, char_to_gid: &HashMap<char, u16>) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() * 2);
    for ch in text.chars() {
        let gid = char_to_gid.get(&ch).copied().unwrap_or(0);
        out.extend_from_slice(&gid.to_be_bytes());
    }
    out
}

/// Six-letter tag marking an embedded subset, stable for the same font and
/// char set.
fn subset_tag(name: &str, used_chars: &BTreeSet<char>) -> String {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    used_chars.hash(&mut hasher);
    let mut h = hasher.finish();
    (0..6)
        .map(|_| {
            let c = (b'A' + (h % 26) as u8) as char;
            h /= 26;
            c
        })
        .collect()
}

fn postscript_name(face: &Face, family: &str) -> String {
    let from_table = face
        .names()
        .into_iter()
        .filter(|n| n.name_id == ttf_parser::name_id::POST_SCRIPT_NAME)
        .find_map(|n| n.to_string());
    from_table
        .unwrap_or_else(|| family.to_string())
        .chars()
        .filter(|c| c.is_ascii_graphic() && !"()<>[]{}/%#".contains(*c))
        .collect()
}

/// Embeds a TrueType/OpenType face as a Type0 font with Identity-H encoding.
/// With `subset` the file is cut down to `used_chars`; without it the whole
/// file goes in and glyph ids stay as in the face.
pub(crate) fn embed_truetype(
    doc: &mut PdfDocument,
    font: &LoadedFont,
    used_chars: &BTreeSet<char>,
    subset: bool,
) -> Result<(ObjectId, HashMap<char, u16>), Error> {
    let embed_err = |msg: String| Error::GlyphEmbedding(format!("{}: {}", font.family, msg));
    let (font_data, face_index) = font
        .data()
        .ok_or_else(|| embed_err("no font program".into()))?;
    let face = Face::parse(font_data, face_index).map_err(|e| embed_err(e.to_string()))?;
    if face.tables().glyf.is_none() {
        return Err(embed_err("no glyf outlines to embed as FontFile2".into()));
    }
    if face.permissions() == Some(Permissions::Restricted) {
        return Err(embed_err("license forbids embedding (fsType restricted)".into()));
    }
    if subset && !face.is_subsetting_allowed() {
        return Err(embed_err("license forbids subsetting".into()));
    }

    let units = face.units_per_em() as f32;
    let to_1000 = |v: f32| v / units * 1000.0;

    let mut char_to_gid = HashMap::new();
    let mut gid_widths: Vec<(u16, f32)> = Vec::new();
    let program = if subset {
        let mut remapper = subsetter::GlyphRemapper::new();
        for &ch in used_chars {
            if let Some(gid) = face.glyph_index(ch) {
                let new_gid = remapper.remap(gid.0);
                char_to_gid.insert(ch, new_gid);
                let w = face.glyph_hor_advance(gid).map(|a| to_1000(a as f32)).unwrap_or(0.0);
                gid_widths.push((new_gid, w));
            }
        }
        subsetter::subset(font_data, face_index, &remapper)
            .map_err(|e| embed_err(format!("subsetting failed: {e}")))?
    } else {
        for &ch in used_chars {
            if let Some(gid) = face.glyph_index(ch) {
                char_to_gid.insert(ch, gid.0);
                let w = face.glyph_hor_advance(gid).map(|a| to_1000(a as f32)).unwrap_or(0.0);
                gid_widths.push((gid.0, w));
            }
        }
        font_data.to_vec()
    };
    gid_widths.sort_by_key(|&(gid, _)| gid);
    gid_widths.dedup_by_key(|&mut (gid, _)| gid);

    let ps_name = postscript_name(&face, &font.family);
    let base_font = if subset {
        format!("{}+{}", subset_tag(&ps_name, used_chars), ps_name)
    } else {
        ps_name.clone()
    };

    let data_len = program.len() as i64;
    let data_id = doc.add_stream(dictionary! { "Length1" => data_len }, &program);

    let bb = face.global_bounding_box();
    let cap_height = face
        .capital_height()
        .map(|h| to_1000(h as f32))
        .unwrap_or(700.0);
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => Object::Name(base_font.clone().into_bytes()),
        "Flags" => 32,
        "FontBBox" => vec![
            to_1000(bb.x_min as f32).into(),
            to_1000(bb.y_min as f32).into(),
            to_1000(bb.x_max as f32).into(),
            to_1000(bb.y_max as f32).into(),
        ],
        "ItalicAngle" => 0,
        "Ascent" => to_1000(face.ascender() as f32),
        "Descent" => to_1000(face.descender() as f32),
        "CapHeight" => cap_height,
        "StemV" => 80,
        "FontFile2" => data_id,
    });

    let mut widths = Vec::with_capacity(gid_widths.len() * 2);
    for (gid, w) in &gid_widths {
        widths.push(Object::Integer(*gid as i64));
        widths.push(Object::Array(vec![Object::Real(*w)]));
    }
    let cid_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => Object::Name(base_font.clone().into_bytes()),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "DW" => 0,
        "W" => widths,
        "CIDToGIDMap" => "Identity",
    });

    let cmap_name = format!("{}-UTF16", ps_name);
    let mut cmap = pdf_writer::types::UnicodeCmap::new(
        Name(cmap_name.as_bytes()),
        pdf_writer::types::SystemInfo {
            registry: pdf_writer::Str(b"Adobe"),
            ordering: pdf_writer::Str(b"Identity"),
            supplement: 0,
        },
    );
    let mut pairs: Vec<(u16, char)> = char_to_gid.iter().map(|(&ch, &gid)| (gid, ch)).collect();
    pairs.sort();
    let mut seen = HashSet::new();
    for (gid, ch) in pairs {
        if seen.insert(gid) {
            cmap.pair(gid, ch);
        }
    }
    let cmap_data = cmap.finish();
    let to_unicode_id = doc.add_stream(dictionary! {}, cmap_data.as_slice());

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => Object::Name(base_font.into_bytes()),
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(cid_id)],
        "ToUnicode" => to_unicode_id,
    });
    Ok((font_id, char_to_gid))
}

fn embed_standard(doc: &mut PdfDocument, font: StandardFont) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => font.base_name(),
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Font resources written during one flatten, one object per face.
pub(crate) struct FontRegistry {
    fonts: HashMap<FontKey, EmbeddedFont>,
    taken: HashSet<String>,
    counter: usize,
}

impl FontRegistry {
    /// Names already used by any page's resources are never handed out.
    pub(crate) fn new(doc: &PdfDocument) -> Self {
        let mut taken = HashSet::new();
        for page in 0..doc.page_count() {
            for category in ["Font", "XObject"] {
                taken.extend(doc.resource_names(page, category));
            }
        }
        Self {
            fonts: HashMap::new(),
            taken,
            counter: 0,
        }
    }

    pub(crate) fn fresh_name(&mut self, prefix: &str) -> String {
        loop {
            self.counter += 1;
            let name = format!("{}{}", prefix, self.counter);
            if self.taken.insert(name.clone()) {
                return name;
            }
        }
    }

    /// Drops the cached resource so the next registration starts over.
    pub(crate) fn forget(&mut self, key: &FontKey) {
        self.fonts.remove(key);
    }

    pub(crate) fn register(
        &mut self,
        doc: &mut PdfDocument,
        font: &LoadedFont,
        used_chars: &BTreeSet<char>,
        subset: bool,
    ) -> Result<EmbeddedFont, Error> {
        let key = font.key();
        if let Some(existing) = self.fonts.get(&key) {
            return Ok(existing.clone());
        }
        let t0 = std::time::Instant::now();
        let (id, encoding) = match font.standard_font() {
            Some(standard) => (embed_standard(doc, standard), TextEncoding::WinAnsi),
            None => {
                let (id, map) = embed_truetype(doc, font, used_chars, subset)?;
                (id, TextEncoding::Cid(map))
            }
        };
        let embedded = EmbeddedFont {
            resource: self.fresh_name("RtxF"),
            id,
            encoding,
        };
        log::debug!(
            "Embedded {} ({} chars, subset={}) in {:.1}ms",
            font.family,
            used_chars.len(),
            subset,
            t0.elapsed().as_secs_f64() * 1000.0,
        );
        self.fonts.insert(key, embedded.clone());
        Ok(embedded)
    }
}
