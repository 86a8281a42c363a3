use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};

use crate::error::{PipelineError, PipelineResult};
use crate::ocr::TextRecognizer;
use crate::providers::{Provider, ProviderFuture, ProviderResponse};

/// Provider that answers every request with a canned response.
#[derive(Debug, Clone)]
pub(crate) struct MockProvider {
    response: Result<String, String>,
    credentials: bool,
    pending: Vec<String>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    pub(crate) fn new(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            credentials: true,
            pending: Vec::new(),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            ..Self::new("")
        }
    }

    pub(crate) fn without_credentials(mut self) -> Self {
        self.credentials = false;
        self
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.prompts().len()
    }
}

impl Provider for MockProvider {
    fn has_credentials(&self) -> bool {
        self.credentials
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.pending.push(input);
        self
    }

    fn generate(self) -> ProviderFuture {
        Box::pin(async move {
            self.prompts
                .lock()
                .expect("prompts lock")
                .push(self.pending.join("\n\n"));
            match self.response {
                Ok(text) => Ok(ProviderResponse {
                    text,
                    model: Some("mock".to_string()),
                    usage: None,
                }),
                Err(message) => Err(anyhow!(message)),
            }
        })
    }
}

/// Recognizer that reports the image width instead of reading it.
#[derive(Debug, Clone)]
pub(crate) struct ScriptedRecognizer {
    fail_on: Option<usize>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedRecognizer {
    pub(crate) fn by_width() -> Self {
        Self {
            fail_on: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fails on the `call`-th image (1-based).
    pub(crate) fn failing_on(call: usize) -> Self {
        Self {
            fail_on: Some(call),
            ..Self::by_width()
        }
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(&self, image: &DynamicImage) -> PipelineResult<Vec<String>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on == Some(call) {
            return Err(PipelineError::Ocr(format!("scripted failure on call {}", call)));
        }
        Ok(vec![format!("width {}", image.width()), "line two".to_string()])
    }
}

pub(crate) fn gray_image_stream(width: u32, height: u32) -> Stream {
    let samples = (0..width * height).map(|idx| (idx * 37 % 256) as u8).collect();
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        samples,
    )
}

/// A DCT image stream plus the JPEG bytes stored in it.
pub(crate) fn jpeg_image_stream(width: u32, height: u32) -> (Stream, Vec<u8>) {
    let raster = GrayImage::from_fn(width, height, |x, y| Luma([((x + y) * 16 % 256) as u8]));
    let mut jpeg = Vec::new();
    DynamicImage::ImageLuma8(raster)
        .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
        .expect("encode jpeg");
    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg.clone(),
    );
    (stream, jpeg)
}

/// Writes a PDF whose pages reference the given XObject streams, named
/// `/Im0`, `/Im1`, ... in order.
pub(crate) fn write_test_pdf(path: &Path, pages: Vec<Vec<Stream>>) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();

    for streams in pages {
        let mut xobjects = Dictionary::new();
        for (idx, stream) in streams.into_iter().enumerate() {
            let id = doc.add_object(stream);
            xobjects.set(format!("Im{}", idx), Object::Reference(id));
        }
        kids.push(add_page(&mut doc, pages_id, xobjects));
    }

    save_document(doc, pages_id, kids, path);
}

/// One page listing `/Fm0` then `/Im0`. The form draws `nested` and lists
/// itself again to exercise cycle handling.
pub(crate) fn write_form_pdf(path: &Path, direct: Stream, nested: Stream) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let nested_id = doc.add_object(nested);
    let form_id = doc.new_object_id();
    let form = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => Object::Array(vec![0.into(), 0.into(), 10.into(), 10.into()]),
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => Object::Reference(nested_id),
                    "Fm0" => Object::Reference(form_id),
                },
            },
        },
        b"/Im0 Do".to_vec(),
    );
    doc.objects.insert(form_id, Object::Stream(form));
    let direct_id = doc.add_object(direct);

    let xobjects = dictionary! {
        "Fm0" => Object::Reference(form_id),
        "Im0" => Object::Reference(direct_id),
    };
    let page = add_page(&mut doc, pages_id, xobjects);
    save_document(doc, pages_id, vec![page], path);
}

fn add_page(doc: &mut Document, pages_id: ObjectId, xobjects: Dictionary) -> Object {
    let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! { "XObject" => xobjects },
        "MediaBox" => Object::Array(vec![0.into(), 0.into(), 200.into(), 200.into()]),
    });
    Object::Reference(page_id)
}

fn save_document(mut doc: Document, pages_id: ObjectId, kids: Vec<Object>, path: &Path) {
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("save pdf");
}
