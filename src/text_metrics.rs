//! Font-backed text measurement through `fontdb` and `ttf-parser`.
//!
//! Faces are resolved once per family list and cached for the process. When
//! no usable face exists the caller falls back to per-character estimates.

use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use ttf_parser::Face;

static FONT_CACHE: Lazy<Mutex<FontCache>> = Lazy::new(|| Mutex::new(FontCache::new()));

/// Horizontal advance of `text` in points, or `None` when no face matches.
pub fn measure_text_width(text: &str, font_size: f64, font_family: &str) -> Option<f64> {
    if text.is_empty() || font_size <= 0.0 {
        return Some(0.0);
    }
    let mut cache = FONT_CACHE.lock().ok()?;
    let face = cache.face(font_family)?;
    Some(face.width(text, font_size))
}

/// Ascender minus descender plus line gap, in points.
pub fn line_height(font_size: f64, font_family: &str) -> Option<f64> {
    if font_size <= 0.0 {
        return None;
    }
    let mut cache = FONT_CACHE.lock().ok()?;
    let face = cache.face(font_family)?;
    Some(face.line_height * font_size)
}

struct FontCache {
    db: Database,
    loaded_system_fonts: bool,
    faces: HashMap<String, Option<FaceMetrics>>,
}

impl FontCache {
    fn new() -> Self {
        Self {
            db: Database::new(),
            loaded_system_fonts: false,
            faces: HashMap::new(),
        }
    }

    fn face(&mut self, font_family: &str) -> Option<&FaceMetrics> {
        let key = family_key(font_family);
        if !self.faces.contains_key(&key) {
            let face = self.load(font_family);
            if face.is_none() {
                tracing::debug!(family = %key, "no font face found, using estimated metrics");
            }
            self.faces.insert(key.clone(), face);
        }
        self.faces.get(&key).and_then(|face| face.as_ref())
    }

    fn load(&mut self, font_family: &str) -> Option<FaceMetrics> {
        let names: Vec<String> = font_family
            .split(',')
            .map(|part| part.trim().trim_matches('"').trim_matches('\'').to_string())
            .filter(|part| !part.is_empty())
            .collect();
        let mut families: Vec<Family<'_>> = names
            .iter()
            .map(|name| match name.to_ascii_lowercase().as_str() {
                "serif" | "times" | "times-roman" | "times new roman" => Family::Serif,
                "sans-serif" | "helvetica" | "arial" => Family::SansSerif,
                "monospace" | "courier" => Family::Monospace,
                _ => Family::Name(name.as_str()),
            })
            .collect();
        families.push(Family::Serif);

        if !self.loaded_system_fonts {
            self.db.load_system_fonts();
            self.loaded_system_fonts = true;
        }
        let query = Query {
            families: &families,
            weight: Weight::NORMAL,
            stretch: Stretch::Normal,
            style: Style::Normal,
        };
        let id = self.db.query(&query)?;
        self.db
            .with_face_data(id, |data, index| FaceMetrics::from_data(data, index))
            .flatten()
    }
}

/// Advances and vertical metrics extracted from a face, normalised to a
/// font size of 1.
struct FaceMetrics {
    data: Vec<u8>,
    index: u32,
    ascii_advances: [f64; 128],
    line_height: f64,
    fallback_advance: f64,
}

impl FaceMetrics {
    fn from_data(data: &[u8], index: u32) -> Option<Self> {
        let face = Face::parse(data, index).ok()?;
        let upem = f64::from(face.units_per_em().max(1));
        let mut ascii_advances = [0.0; 128];
        for byte in 0u8..128 {
            if let Some(glyph) = face.glyph_index(byte as char) {
                ascii_advances[byte as usize] =
                    f64::from(face.glyph_hor_advance(glyph).unwrap_or(0)) / upem;
            }
        }
        let line_height = f64::from(
            i32::from(face.ascender()) - i32::from(face.descender()) + i32::from(face.line_gap()),
        ) / upem;
        Some(Self {
            data: data.to_vec(),
            index,
            ascii_advances,
            line_height: if line_height > 0.0 { line_height } else { 1.2 },
            fallback_advance: 0.56,
        })
    }

    fn width(&self, text: &str, font_size: f64) -> f64 {
        if text.is_ascii() {
            return text
                .bytes()
                .filter(|b| *b != b'\n')
                .map(|b| match self.ascii_advances[b as usize] {
                    a if a > 0.0 => a,
                    _ => self.fallback_advance,
                })
                .sum::<f64>()
                * font_size;
        }
        let Ok(face) = Face::parse(&self.data, self.index) else {
            return text.chars().count() as f64 * self.fallback_advance * font_size;
        };
        let upem = f64::from(face.units_per_em().max(1));
        text.chars()
            .filter(|c| *c != '\n')
            .map(|c| {
                face.glyph_index(c)
                    .and_then(|g| face.glyph_hor_advance(g))
                    .map(|a| f64::from(a) / upem)
                    .unwrap_or(self.fallback_advance)
            })
            .sum::<f64>()
            * font_size
    }
}

fn family_key(font_family: &str) -> String {
    let trimmed = font_family.trim();
    if trimmed.is_empty() {
        "serif".to_string()
    } else {
        trimmed.to_ascii_lowercase()
    }
}
