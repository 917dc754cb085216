use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};

use crate::error::Error;
use crate::geometry::{Point, Rect};

/// Visible page area in PDF user space (origin bottom-left).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PageBox {
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Top-left page point to PDF user space.
    pub fn to_pdf(&self, p: Point) -> (f32, f32) {
        (self.x0 + p.x, self.y1 - p.y)
    }

    /// Top-left rect to PDF `(x, y, w, h)` with y at the bottom edge.
    pub fn rect_to_pdf(&self, r: Rect) -> (f32, f32, f32, f32) {
        (self.x0 + r.x0, self.y1 - r.y1, r.width(), r.height())
    }

    pub fn page_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width(), self.height())
    }
}

/// An existing PDF opened for in-place edits.
#[derive(Clone, Debug)]
pub struct PdfDocument {
    doc: Document,
    pages: Vec<ObjectId>,
}

fn obj_to_f32(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f),
        _ => None,
    }
}

pub(crate) fn deflate(data: &[u8]) -> Vec<u8> {
    miniz_oxide::deflate::compress_to_vec_zlib(data, 6)
}

impl PdfDocument {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let doc = Document::load_mem(bytes)?;
        let pages = doc.get_pages().into_values().collect();
        Ok(Self { doc, pages })
    }

    pub fn open(path: &Path) -> Result<Self, Error> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        self.doc.save_to(&mut buf)?;
        Ok(buf)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn inner(&self) -> &Document {
        &self.doc
    }

    pub(crate) fn page_id(&self, page: usize) -> Result<ObjectId, Error> {
        self.pages
            .get(page)
            .copied()
            .ok_or(Error::PageOutOfRange(page))
    }

    fn page_dict(&self, id: ObjectId) -> Result<&Dictionary, Error> {
        Ok(self.doc.get_object(id)?.as_dict()?)
    }

    fn page_dict_mut(&mut self, id: ObjectId) -> Result<&mut Dictionary, Error> {
        Ok(self.doc.get_object_mut(id)?.as_dict_mut()?)
    }

    /// Follows a reference, if `obj` is one.
    fn deref<'a>(&'a self, obj: &'a Object) -> &'a Object {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).unwrap_or(obj),
            other => other,
        }
    }

    /// Page attribute, looked up through the `Parent` chain when the page
    /// inherits it.
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<Object> {
        let mut current = Some(page_id);
        let mut hops = 0;
        while let Some(id) = current {
            let dict = self.doc.get_object(id).ok()?.as_dict().ok()?;
            if let Ok(obj) = dict.get(key) {
                return Some(self.deref(obj).clone());
            }
            current = dict.get(b"Parent").and_then(|p| p.as_reference()).ok();
            hops += 1;
            if hops > 64 {
                return None;
            }
        }
        None
    }

    /// CropBox, else MediaBox, else US Letter. Rotation is ignored.
    pub fn page_box(&self, page: usize) -> Result<PageBox, Error> {
        let id = self.page_id(page)?;
        for key in [&b"CropBox"[..], &b"MediaBox"[..]] {
            let Some(Object::Array(arr)) = self.inherited(id, key) else {
                continue;
            };
            let nums: Vec<f32> = arr
                .iter()
                .filter_map(|o| obj_to_f32(self.deref(o)))
                .collect();
            if nums.len() == 4 {
                return Ok(PageBox {
                    x0: nums[0].min(nums[2]),
                    y0: nums[1].min(nums[3]),
                    x1: nums[0].max(nums[2]),
                    y1: nums[1].max(nums[3]),
                });
            }
        }
        Ok(PageBox {
            x0: 0.0,
            y0: 0.0,
            x1: 612.0,
            y1: 792.0,
        })
    }

    pub fn page_size(&self, page: usize) -> Result<(f32, f32), Error> {
        let b = self.page_box(page)?;
        Ok((b.width(), b.height()))
    }

    /// Number of content streams on a page.
    pub fn content_stream_count(&self, page: usize) -> Result<usize, Error> {
        let id = self.page_id(page)?;
        Ok(match self.page_dict(id)?.get(b"Contents") {
            Ok(obj) => match self.deref(obj) {
                Object::Array(arr) => arr.len(),
                _ => 1,
            },
            Err(_) => 0,
        })
    }

    pub(crate) fn add_object(&mut self, obj: impl Into<Object>) -> ObjectId {
        self.doc.add_object(obj)
    }

    /// Adds a Flate-compressed stream.
    pub(crate) fn add_stream(&mut self, mut dict: Dictionary, data: &[u8]) -> ObjectId {
        dict.set("Filter", "FlateDecode");
        self.doc.add_object(Stream::new(dict, deflate(data)))
    }

    fn contents_array(&self, page_id: ObjectId) -> Result<Vec<Object>, Error> {
        Ok(match self.page_dict(page_id)?.get(b"Contents") {
            Ok(Object::Reference(id)) => match self.doc.get_object(*id)? {
                Object::Array(arr) => arr.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Array(arr)) => arr.clone(),
            _ => Vec::new(),
        })
    }

    /// Wraps the page's existing content in `q`/`Q` so streams appended
    /// afterwards start from the default graphics state.
    pub(crate) fn isolate_content(&mut self, page: usize) -> Result<(), Error> {
        let page_id = self.page_id(page)?;
        let existing = self.contents_array(page_id)?;
        if existing.is_empty() {
            return Ok(());
        }
        let open = self.doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
        let close = self.doc.add_object(Stream::new(dictionary! {}, b"\nQ\n".to_vec()));
        let mut wrapped = Vec::with_capacity(existing.len() + 2);
        wrapped.push(Object::Reference(open));
        wrapped.extend(existing);
        wrapped.push(Object::Reference(close));
        self.page_dict_mut(page_id)?.set("Contents", wrapped);
        Ok(())
    }

    /// Appends one compressed content stream to a page.
    pub(crate) fn append_content(&mut self, page: usize, content: &[u8]) -> Result<(), Error> {
        let page_id = self.page_id(page)?;
        let mut contents = self.contents_array(page_id)?;
        let stream_id = self.add_stream(dictionary! {}, content);
        contents.push(Object::Reference(stream_id));
        self.page_dict_mut(page_id)?.set("Contents", contents);
        Ok(())
    }

    /// Registers `id` under `/Resources/<category>/<name>` of a page. The
    /// page gets its own copy of inherited or shared resource dictionaries
    /// so other pages are not affected.
    pub(crate) fn add_resource(
        &mut self,
        page: usize,
        category: &str,
        name: &str,
        id: ObjectId,
    ) -> Result<(), Error> {
        let page_id = self.page_id(page)?;
        let mut resources = match self.inherited(page_id, b"Resources") {
            Some(Object::Dictionary(d)) => d,
            _ => Dictionary::new(),
        };
        let mut entries = match resources.get(category.as_bytes()) {
            Ok(obj) => match self.deref(obj) {
                Object::Dictionary(d) => d.clone(),
                _ => Dictionary::new(),
            },
            Err(_) => Dictionary::new(),
        };
        entries.set(name, id);
        resources.set(category, entries);
        self.page_dict_mut(page_id)?.set("Resources", resources);
        Ok(())
    }

    /// Resource names already used on a page in `category`.
    pub(crate) fn resource_names(&self, page: usize, category: &str) -> Vec<String> {
        let Ok(page_id) = self.page_id(page) else {
            return Vec::new();
        };
        let Some(Object::Dictionary(resources)) = self.inherited(page_id, b"Resources") else {
            return Vec::new();
        };
        match resources.get(category.as_bytes()).map(|o| self.deref(o)) {
            Ok(Object::Dictionary(d)) => d
                .iter()
                .map(|(k, _)| String::from_utf8_lossy(k).into_owned())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Serializes and writes to `path` through a sibling temporary file that
    /// is renamed into place, so a failure never leaves a partial file.
    pub fn save_atomic(&mut self, path: &Path) -> Result<Vec<u8>, Error> {
        let bytes = self.to_bytes()?;
        write_atomic(path, &bytes)?;
        Ok(bytes)
    }
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let write_err = |source| Error::Write {
        path: path.to_path_buf(),
        source,
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));
    std::fs::write(&tmp, bytes).map_err(write_err)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(write_err(e));
    }
    Ok(())
}
