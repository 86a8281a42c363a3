use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

const MAX_PARENT_DEPTH: usize = 32;
const MAX_FORM_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Jpeg,
    Jpeg2000,
    Png,
}

/// One picture object pulled out of a page's resources.
#[derive(Debug, Clone)]
pub struct ExtractedImage {
    pub page: usize,
    pub index: usize,
    pub encoding: ImageEncoding,
    pub bytes: Vec<u8>,
}

impl ExtractedImage {
    pub fn decode(&self) -> PipelineResult<DynamicImage> {
        image::load_from_memory(&self.bytes).map_err(|err| PipelineError::ImageDecode {
            page: self.page,
            image: self.index,
            message: err.to_string(),
        })
    }
}

/// Embedded images of a PDF, walked page by page.
pub struct PdfImages {
    document: Document,
    pages: Vec<ObjectId>,
}

impl PdfImages {
    pub fn open(path: &Path) -> PipelineResult<Self> {
        let document = Document::load(path).map_err(|source| PipelineError::DocumentOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let pages = document.get_pages().into_values().collect::<Vec<_>>();
        debug!("opened {} ({} pages)", path.display(), pages.len());
        Ok(Self { document, pages })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Yields images in page order, then in the order the page lists them.
    /// Each image is only decoded from the document when the iterator reaches it.
    pub fn iter(&self) -> impl Iterator<Item = PipelineResult<ExtractedImage>> + '_ {
        self.pages
            .iter()
            .enumerate()
            .flat_map(move |(page, page_id)| {
                page_image_streams(&self.document, *page_id)
                    .into_iter()
                    .enumerate()
                    .map(move |(index, stream)| {
                        extract_image(&self.document, stream, page, index)
                    })
            })
    }
}

fn page_image_streams(document: &Document, page_id: ObjectId) -> Vec<&Stream> {
    let mut images = Vec::new();
    if let Some(resources) = page_resources(document, page_id) {
        let mut visited = HashSet::new();
        collect_images(document, resources, 0, &mut visited, &mut images);
    }
    images
}

/// Walks a `/Resources` dictionary in listing order. Images drawn through a
/// form XObject are collected where the form is listed.
fn collect_images<'a>(
    document: &'a Document,
    resources: &'a Dictionary,
    depth: usize,
    visited: &mut HashSet<ObjectId>,
    images: &mut Vec<&'a Stream>,
) {
    if depth > MAX_FORM_DEPTH {
        return;
    }
    let Some(xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|object| resolve(document, object))
        .and_then(|object| object.as_dict().ok())
    else {
        return;
    };

    for (_, object) in xobjects.iter() {
        if let Object::Reference(id) = object
            && !visited.insert(*id)
        {
            continue;
        }
        let Some(stream) = resolve(document, object).and_then(|object| object.as_stream().ok())
        else {
            continue;
        };
        match xobject_subtype(document, stream) {
            Some(b"Image") => images.push(stream),
            Some(b"Form") => {
                if let Some(form_resources) = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|object| resolve(document, object))
                    .and_then(|object| object.as_dict().ok())
                {
                    collect_images(document, form_resources, depth + 1, visited, images);
                }
            }
            _ => {}
        }
    }
}

fn xobject_subtype<'a>(document: &'a Document, stream: &'a Stream) -> Option<&'a [u8]> {
    stream
        .dict
        .get(b"Subtype")
        .ok()
        .and_then(|subtype| resolve(document, subtype))
        .and_then(|subtype| subtype.as_name().ok())
}

fn page_resources(document: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = document.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_PARENT_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            return resolve(document, resources).and_then(|object| object.as_dict().ok());
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = document.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}

fn extract_image(
    document: &Document,
    stream: &Stream,
    page: usize,
    index: usize,
) -> PipelineResult<ExtractedImage> {
    let decode_error = |message: String| PipelineError::ImageDecode {
        page,
        image: index,
        message,
    };

    let filters = stream_filters(stream);
    let (encoding, bytes) = match filters.last().map(Vec::as_slice) {
        Some(b"DCTDecode") if filters.len() == 1 => (ImageEncoding::Jpeg, stream.content.clone()),
        Some(b"JPXDecode") if filters.len() == 1 => {
            (ImageEncoding::Jpeg2000, stream.content.clone())
        }
        Some(b"DCTDecode") | Some(b"JPXDecode") => {
            return Err(decode_error(format!(
                "unsupported filter chain: {}",
                filters
                    .iter()
                    .map(|name| String::from_utf8_lossy(name).to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        _ => {
            let samples = decoded_content(stream).map_err(decode_error)?;
            let raster = rebuild_raster(document, &stream.dict, &samples).map_err(decode_error)?;
            let mut png = Vec::new();
            raster
                .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
                .map_err(|err| decode_error(format!("failed to encode png: {}", err)))?;
            (ImageEncoding::Png, png)
        }
    };

    debug!(
        "page {} image {}: {:?}, {} bytes",
        page,
        index,
        encoding,
        bytes.len()
    );
    Ok(ExtractedImage {
        page,
        index,
        encoding,
        bytes,
    })
}

fn stream_filters(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

/// Stream bytes with every lopdf-supported filter undone.
fn decoded_content(stream: &Stream) -> Result<Vec<u8>, String> {
    if stream.dict.get(b"Filter").is_err() {
        return Ok(stream.content.clone());
    }
    // lopdf refuses to decompress anything tagged /Subtype /Image.
    let mut plain = stream.clone();
    plain.dict.remove(b"Subtype");
    plain
        .decompressed_content()
        .map_err(|err| format!("failed to decompress: {}", err))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
}

impl ColorModel {
    fn components(self) -> usize {
        match self {
            ColorModel::Gray => 1,
            ColorModel::Rgb => 3,
            ColorModel::Cmyk => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ColorSpace {
    Direct(ColorModel),
    /// Palette of `base` colours, one entry per index up to `hival`.
    Indexed {
        base: ColorModel,
        hival: usize,
        lookup: Vec<u8>,
    },
}

fn rebuild_raster(
    document: &Document,
    dict: &Dictionary,
    samples: &[u8],
) -> Result<DynamicImage, String> {
    let width = dict_integer(document, dict, b"Width").ok_or("missing /Width")?;
    let height = dict_integer(document, dict, b"Height").ok_or("missing /Height")?;
    let (width, height) = match (u32::try_from(width), u32::try_from(height)) {
        (Ok(width), Ok(height)) if width > 0 && height > 0 => (width, height),
        _ => return Err(format!("invalid dimensions {}x{}", width, height)),
    };

    let is_mask = dict
        .get(b"ImageMask")
        .and_then(Object::as_bool)
        .unwrap_or(false);
    let bits = if is_mask {
        1
    } else {
        dict_integer(document, dict, b"BitsPerComponent").unwrap_or(8)
    };
    let space = if is_mask {
        ColorSpace::Direct(ColorModel::Gray)
    } else {
        color_space(document, dict)?
    };

    match space {
        ColorSpace::Direct(model) => {
            let layout = SampleLayout::new(width, height, model.components(), bits)?;
            let mut values = layout.unpack(samples, true)?;
            apply_decode_inversion(document, dict, model.components(), &mut values);
            raster_from_components(model, width, height, values)
        }
        ColorSpace::Indexed {
            base,
            hival,
            lookup,
        } => {
            if bits > 8 {
                return Err(format!("{} bit palette indices", bits));
            }
            let layout = SampleLayout::new(width, height, 1, bits)?;
            let indices = layout.unpack(samples, false)?;
            let values = expand_palette(&indices, base, hival, &lookup)?;
            raster_from_components(base, width, height, values)
        }
    }
}

/// Row-padded packing of `bits`-wide samples, as image XObjects store them.
struct SampleLayout {
    per_row: usize,
    stride: usize,
    rows: usize,
    total: usize,
    bits: usize,
}

impl SampleLayout {
    fn new(width: u32, height: u32, components: usize, bits: i64) -> Result<Self, String> {
        let bits = match bits {
            1 | 2 | 4 | 8 | 16 => bits as usize,
            other => return Err(format!("unsupported {} bits per component", other)),
        };
        let too_large = || format!("image too large ({}x{})", width, height);
        let per_row = (width as usize)
            .checked_mul(components)
            .ok_or_else(too_large)?;
        let stride = per_row
            .checked_mul(bits)
            .map(|row_bits| row_bits.div_ceil(8))
            .ok_or_else(too_large)?;
        let total = stride
            .checked_mul(height as usize)
            .ok_or_else(too_large)?;
        Ok(Self {
            per_row,
            stride,
            rows: height as usize,
            total,
            bits,
        })
    }

    /// One byte per sample. With `scale` the value is stretched to 0..=255,
    /// otherwise the raw value is kept (palette indices).
    fn unpack(&self, samples: &[u8], scale: bool) -> Result<Vec<u8>, String> {
        let data = take_samples(samples, self.total)?;
        let max = (1u32 << self.bits.min(8)) - 1;
        let mut values = Vec::with_capacity(self.per_row * self.rows);
        for row in data.chunks_exact(self.stride) {
            for idx in 0..self.per_row {
                let value = match self.bits {
                    8 => row[idx],
                    16 => row[idx * 2],
                    bits => {
                        let offset = idx * bits;
                        let shift = 8 - bits - offset % 8;
                        (row[offset / 8] >> shift) & max as u8
                    }
                };
                values.push(if scale && self.bits < 8 {
                    (value as u32 * 255 / max) as u8
                } else {
                    value
                });
            }
        }
        Ok(values)
    }
}

/// A `/Decode` pair running high to low flips that component.
fn apply_decode_inversion(
    document: &Document,
    dict: &Dictionary,
    components: usize,
    values: &mut [u8],
) {
    let Some(ranges) = dict
        .get(b"Decode")
        .ok()
        .and_then(|object| resolve(document, object))
        .and_then(|object| object.as_array().ok())
    else {
        return;
    };
    let inverted = (0..components)
        .map(|component| {
            let low = ranges.get(component * 2).and_then(|value| value.as_float().ok());
            let high = ranges.get(component * 2 + 1).and_then(|value| value.as_float().ok());
            matches!((low, high), (Some(low), Some(high)) if low > high)
        })
        .collect::<Vec<_>>();
    if !inverted.contains(&true) {
        return;
    }
    for (idx, value) in values.iter_mut().enumerate() {
        if inverted[idx % components] {
            *value = 255 - *value;
        }
    }
}

fn expand_palette(
    indices: &[u8],
    base: ColorModel,
    hival: usize,
    lookup: &[u8],
) -> Result<Vec<u8>, String> {
    let width = base.components();
    let entries = (lookup.len() / width).min(hival + 1);
    if entries == 0 {
        return Err("empty /Indexed lookup table".to_string());
    }
    let mut values = Vec::with_capacity(indices.len() * width);
    for &index in indices {
        let entry = (index as usize).min(entries - 1) * width;
        values.extend_from_slice(&lookup[entry..entry + width]);
    }
    Ok(values)
}

fn raster_from_components(
    model: ColorModel,
    width: u32,
    height: u32,
    values: Vec<u8>,
) -> Result<DynamicImage, String> {
    match model {
        ColorModel::Gray => GrayImage::from_raw(width, height, values)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| "gray buffer size mismatch".to_string()),
        ColorModel::Rgb => RgbImage::from_raw(width, height, values)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| "rgb buffer size mismatch".to_string()),
        ColorModel::Cmyk => {
            let rgb = values
                .chunks_exact(4)
                .flat_map(|px| {
                    let k = 255 - px[3] as u32;
                    [
                        ((255 - px[0] as u32) * k / 255) as u8,
                        ((255 - px[1] as u32) * k / 255) as u8,
                        ((255 - px[2] as u32) * k / 255) as u8,
                    ]
                })
                .collect::<Vec<_>>();
            RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| "cmyk buffer size mismatch".to_string())
        }
    }
}

fn color_space(document: &Document, dict: &Dictionary) -> Result<ColorSpace, String> {
    let Some(space) = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|object| resolve(document, object))
    else {
        return Ok(ColorSpace::Direct(ColorModel::Gray));
    };

    if let Ok(items) = space.as_array()
        && let Some(family) = items.first().and_then(|item| item.as_name().ok())
        && matches!(family, b"Indexed" | b"I")
    {
        let base = items
            .get(1)
            .and_then(|item| resolve(document, item))
            .ok_or("missing /Indexed base")?;
        let base = color_model(document, base)?;
        let hival = items
            .get(2)
            .and_then(|item| resolve(document, item))
            .and_then(|item| item.as_i64().ok())
            .and_then(|hival| usize::try_from(hival).ok())
            .ok_or("invalid /Indexed hival")?;
        let lookup = match items.get(3).and_then(|item| resolve(document, item)) {
            Some(Object::String(bytes, _)) => bytes.clone(),
            Some(Object::Stream(stream)) => decoded_content(stream)?,
            _ => return Err("missing /Indexed lookup".to_string()),
        };
        return Ok(ColorSpace::Indexed {
            base,
            hival,
            lookup,
        });
    }

    color_model(document, space).map(ColorSpace::Direct)
}

fn color_model(document: &Document, space: &Object) -> Result<ColorModel, String> {
    match space {
        Object::Name(name) => model_from_name(name),
        Object::Array(items) => {
            let family = items
                .first()
                .and_then(|item| item.as_name().ok())
                .ok_or("empty /ColorSpace array")?;
            if family == b"ICCBased" {
                let components = items
                    .get(1)
                    .and_then(|item| resolve(document, item))
                    .and_then(|item| item.as_stream().ok())
                    .and_then(|profile| dict_integer(document, &profile.dict, b"N"));
                return match components {
                    Some(1) => Ok(ColorModel::Gray),
                    Some(3) => Ok(ColorModel::Rgb),
                    Some(4) => Ok(ColorModel::Cmyk),
                    other => Err(format!("unsupported ICC component count {:?}", other)),
                };
            }
            model_from_name(family)
        }
        _ => Err("malformed /ColorSpace".to_string()),
    }
}

fn model_from_name(name: &[u8]) -> Result<ColorModel, String> {
    match name {
        b"DeviceGray" | b"CalGray" | b"G" => Ok(ColorModel::Gray),
        b"DeviceRGB" | b"CalRGB" | b"RGB" => Ok(ColorModel::Rgb),
        b"DeviceCMYK" | b"CMYK" => Ok(ColorModel::Cmyk),
        other => Err(format!(
            "unsupported color space /{}",
            String::from_utf8_lossy(other)
        )),
    }
}

fn dict_integer(document: &Document, dict: &Dictionary, key: &[u8]) -> Option<i64> {
    dict.get(key)
        .ok()
        .and_then(|object| resolve(document, object))
        .and_then(|object| object.as_i64().ok())
}

fn take_samples(samples: &[u8], expected: usize) -> Result<&[u8], String> {
    samples.get(..expected).ok_or_else(|| {
        format!(
            "image data too short ({} of {} bytes)",
            samples.len(),
            expected
        )
    })
}
