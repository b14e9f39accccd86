//! TrueType embedding for the built-in renderer.
//!
//! A Unicode font is embedded as a Type0 font over a CIDFontType2 with
//! Identity-H encoding, so text is written as big-endian glyph IDs:
//!
//! - **Type0 font** references the descendant CIDFont and a ToUnicode CMap
//! - **CIDFont** carries the widths of the glyphs the document uses
//! - **FontDescriptor** holds the metrics and the `FontFile2` program

use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat, Stream};
use tracing::{debug, info, warn};
use ttf_parser::{Face, GlyphId};

use crate::error::{Error, Result};

/// Well-known locations of broad-coverage TrueType fonts.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// ToUnicode `bfchar` blocks hold at most 100 entries.
const CMAP_BLOCK: usize = 100;

/// Raw bytes of a TrueType font that parsed successfully.
pub struct FontData {
    bytes: Vec<u8>,
    source: PathBuf,
}

impl FontData {
    /// Read and check a font file.
    ///
    /// Only glyf-outline fonts can be embedded as `FontFile2`, so CFF-based
    /// OpenType files are rejected.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| Error::RenderFailed(format!("Failed to read font {}: {e}", path.display())))?;
        let face = Face::parse(&bytes, 0)
            .map_err(|e| Error::RenderFailed(format!("Failed to parse font {}: {e}", path.display())))?;
        if face.tables().glyf.is_none() {
            return Err(Error::RenderFailed(format!(
                "Font {} has no TrueType outlines",
                path.display()
            )));
        }
        Ok(Self {
            bytes,
            source: path.to_path_buf(),
        })
    }

    /// The configured font, else the first usable well-known system font.
    pub fn discover(configured: Option<&Path>) -> Option<Self> {
        if let Some(path) = configured {
            match Self::load(path) {
                Ok(font) => {
                    info!("Built-in renderer uses font {}", path.display());
                    return Some(font);
                }
                Err(e) => warn!("Ignoring configured font: {}", e),
            }
        }

        let found = FONT_CANDIDATES.iter().map(Path::new).find_map(|path| {
            if !path.is_file() {
                return None;
            }
            Self::load(path)
                .inspect_err(|e| debug!("Skipping font: {}", e))
                .ok()
        });
        match &found {
            Some(font) => info!("Built-in renderer uses font {}", font.source.display()),
            None => warn!("No Unicode font found, built-in renderer limited to Latin text"),
        }
        found
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Parse the face for one document.
    pub fn glyphs(&self) -> Result<Glyphs<'_>> {
        let face = Face::parse(&self.bytes, 0)
            .map_err(|e| Error::RenderFailed(format!("Failed to parse font: {e}")))?;
        Ok(Glyphs {
            face,
            bytes: &self.bytes,
            used: BTreeMap::new(),
        })
    }
}

/// A parsed face plus the glyphs one document has drawn with it.
pub struct Glyphs<'a> {
    face: Face<'a>,
    bytes: &'a [u8],
    used: BTreeMap<u16, char>,
}

impl Glyphs<'_> {
    /// Glyph ID for a character, `.notdef` (0) when the font lacks it.
    pub fn glyph_id(&self, c: char) -> u16 {
        self.face.glyph_index(c).map_or(0, |g| g.0)
    }

    fn advance(&self, glyph_id: u16) -> u16 {
        self.face.glyph_hor_advance(GlyphId(glyph_id)).unwrap_or(0)
    }

    /// Width of one character in points at `size`.
    pub fn char_width(&self, c: char, size: f32) -> f32 {
        f32::from(self.advance(self.glyph_id(c))) * size / f32::from(self.face.units_per_em())
    }

    /// Identity-H bytes for `text`, remembering the glyphs for the CMap.
    pub fn encode(&mut self, text: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(text.len() * 2);
        for c in text.chars() {
            let c = if c == '\t' { ' ' } else { c };
            let gid = self.glyph_id(c);
            if gid != 0 {
                self.used.entry(gid).or_insert(c);
            }
            out.extend_from_slice(&gid.to_be_bytes());
        }
        out
    }

    /// Scale font units to the 1000-unit glyph space.
    fn scale(&self, units: u16) -> i64 {
        i64::from(units) * 1000 / i64::from(self.face.units_per_em())
    }

    /// Add the font objects to `doc` and return the Type0 font.
    #[allow(clippy::cast_possible_wrap)] // Font files are far below i64::MAX
    pub fn embed(&self, doc: &mut Document) -> ObjectId {
        let mut file_dict = Dictionary::new();
        file_dict.set("Length1", Object::Integer(self.bytes.len() as i64));
        let font_file_id =
            doc.add_object(Stream::new(file_dict, self.bytes.to_vec()).with_compression(true));

        let bbox = self.face.global_bounding_box();
        let ascent = self.face.ascender();
        let descriptor_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"FontDescriptor".to_vec())),
            ("FontName", Object::Name(b"DocTranslatorUnicode".to_vec())),
            ("Flags", Object::Integer(32)),
            (
                "FontBBox",
                Object::Array(vec![
                    i64::from(bbox.x_min).into(),
                    i64::from(bbox.y_min).into(),
                    i64::from(bbox.x_max).into(),
                    i64::from(bbox.y_max).into(),
                ]),
            ),
            ("ItalicAngle", Object::Integer(0)),
            ("Ascent", Object::Integer(i64::from(ascent))),
            ("Descent", Object::Integer(i64::from(self.face.descender()))),
            (
                "CapHeight",
                Object::Integer(i64::from(self.face.capital_height().unwrap_or(ascent))),
            ),
            ("StemV", Object::Integer(80)),
            ("FontFile2", Object::Reference(font_file_id)),
        ]));

        let cid_font_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"CIDFontType2".to_vec())),
            ("BaseFont", Object::Name(b"DocTranslatorUnicode".to_vec())),
            (
                "CIDSystemInfo",
                Object::Dictionary(Dictionary::from_iter([
                    ("Registry", Object::String(b"Adobe".to_vec(), StringFormat::Literal)),
                    ("Ordering", Object::String(b"Identity".to_vec(), StringFormat::Literal)),
                    ("Supplement", Object::Integer(0)),
                ])),
            ),
            ("FontDescriptor", Object::Reference(descriptor_id)),
            ("DW", Object::Integer(self.scale(self.advance(self.glyph_id(' '))))),
            ("W", Object::Array(self.widths())),
            ("CIDToGIDMap", Object::Name(b"Identity".to_vec())),
        ]));

        let to_unicode_id =
            doc.add_object(Stream::new(Dictionary::new(), self.to_unicode_cmap().into_bytes()));

        doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type0".to_vec())),
            ("BaseFont", Object::Name(b"DocTranslatorUnicode".to_vec())),
            ("Encoding", Object::Name(b"Identity-H".to_vec())),
            ("DescendantFonts", Object::Array(vec![Object::Reference(cid_font_id)])),
            ("ToUnicode", Object::Reference(to_unicode_id)),
        ]))
    }

    /// `W` array over the used glyphs: `[gid [w1 w2 ...]]` per consecutive run.
    fn widths(&self) -> Vec<Object> {
        let mut result = Vec::new();
        let mut iter = self.used.keys().copied().peekable();

        while let Some(first) = iter.next() {
            let mut widths = vec![Object::Integer(self.scale(self.advance(first)))];
            let mut next = first.saturating_add(1);
            while iter.peek() == Some(&next) {
                widths.push(Object::Integer(self.scale(self.advance(next))));
                iter.next();
                next = next.saturating_add(1);
            }
            result.push(Object::Integer(i64::from(first)));
            result.push(Object::Array(widths));
        }

        result
    }

    /// ToUnicode CMap mapping each used glyph back to its character.
    fn to_unicode_cmap(&self) -> String {
        let mut cmap = String::from(
            "/CIDInit /ProcSet findresource begin\n\
             12 dict begin\n\
             begincmap\n\
             /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
             /CMapName /Adobe-Identity-UCS def\n\
             /CMapType 2 def\n\
             1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
        );

        let entries: Vec<_> = self.used.iter().collect();
        for block in entries.chunks(CMAP_BLOCK) {
            let _ = writeln!(cmap, "{} beginbfchar", block.len());
            for (gid, c) in block {
                let _ = write!(cmap, "<{gid:04X}> <");
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(cmap, "{unit:04X}");
                }
                cmap.push_str(">\n");
            }
            cmap.push_str("endbfchar\n");
        }

        cmap.push_str(
            "endcmap\n\
             CMapName currentdict /CMap defineresource pop\n\
             end\n\
             end",
        );
        cmap
    }
}
