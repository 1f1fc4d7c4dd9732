//! Single-page PDF wrapping of a collage.
//!
//! A collage is embedded as a JPEG image XObject (`/DCTDecode`, so the JPEG
//! bytes go into the file untouched) on one fixed-size page. The image keeps
//! its aspect ratio and is centered; see
//! [`place_on_page`](super::calculations::place_on_page).
//!
//! PDF uses a **bottom-left origin**: the `cm` operator maps the unit square of
//! the image onto `(x, y, width, height)` on the page.

use super::backend::{BackendError, Dimensions};
use super::calculations::{Placement, place_on_page};
use super::params::PageSize;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;

/// Resource name of the collage inside the page's `/XObject` dictionary.
const IMAGE_RESOURCE: &str = "Im0";

fn pdf_err(context: &str, e: lopdf::Error) -> BackendError {
    BackendError::Pdf(format!("{context}: {e}"))
}

/// Build a one-page document showing `jpeg` (of size `dims`) on `page`.
pub fn single_page_document(
    jpeg: Vec<u8>,
    dims: Dimensions,
    page: PageSize,
) -> Result<Vec<u8>, BackendError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_dict = Dictionary::from_iter([
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(i64::from(dims.width))),
        ("Height", Object::Integer(i64::from(dims.height))),
        ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
        ("BitsPerComponent", Object::Integer(8)),
        ("Filter", Object::Name(b"DCTDecode".to_vec())),
    ]);
    let image_id = doc.add_object(Stream::new(image_dict, jpeg).with_compression(false));

    let Placement {
        x,
        y,
        width,
        height,
    } = place_on_page(dims.as_tuple(), page);
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0.into(),
                    0.into(),
                    height.into(),
                    x.into(),
                    y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(IMAGE_RESOURCE.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_bytes = content
        .encode()
        .map_err(|e| pdf_err("Failed to encode page content", e))?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content_bytes));

    let resources = Dictionary::from_iter([(
        "XObject",
        Object::Dictionary(Dictionary::from_iter([(
            IMAGE_RESOURCE,
            Object::Reference(image_id),
        )])),
    )]);

    let page_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Page".to_vec())),
        ("Parent", Object::Reference(pages_id)),
        ("Contents", Object::Reference(content_id)),
        ("Resources", Object::Dictionary(resources)),
        (
            "MediaBox",
            Object::Array(vec![
                0.into(),
                0.into(),
                page.width.into(),
                page.height.into(),
            ]),
        ),
    ]));

    let pages = Dictionary::from_iter([
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(vec![Object::Reference(page_id)])),
        ("Count", Object::Integer(1)),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    save(&mut doc)
}

/// Copy every page of `bytes` into a fresh document and serialize it.
///
/// Page content and embedded images are carried over as-is; only the
/// document structure (catalog, page tree, object numbering) is rewritten.
pub fn rebuild_document(bytes: &[u8]) -> Result<Vec<u8>, BackendError> {
    let source = Document::load_mem(bytes).map_err(|e| pdf_err("Failed to load PDF", e))?;

    let mut pages: BTreeMap<ObjectId, Object> = BTreeMap::new();
    for &page_id in source.get_pages().values() {
        let page = source
            .get_object(page_id)
            .map_err(|e| pdf_err("Failed to read page", e))?;
        pages.insert(page_id, page.clone());
    }

    let mut rebuilt = Document::with_version(source.version.clone());
    rebuilt.max_id = source.max_id;
    for (object_id, object) in source.objects {
        match object.type_name().unwrap_or("") {
            "Catalog" | "Pages" | "Page" | "Outlines" | "Outline" => {}
            _ => {
                rebuilt.objects.insert(object_id, object);
            }
        }
    }

    let pages_id = rebuilt.new_object_id();
    for (page_id, page) in &pages {
        if let Object::Dictionary(dict) = page {
            let mut dict = dict.clone();
            dict.set("Parent", Object::Reference(pages_id));
            rebuilt.objects.insert(*page_id, Object::Dictionary(dict));
        }
    }

    let kids: Vec<Object> = pages.keys().map(|&id| Object::Reference(id)).collect();
    let count = kids.len() as i64;
    rebuilt.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(count)),
        ])),
    );

    let catalog_id = rebuilt.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    rebuilt.trailer.set("Root", Object::Reference(catalog_id));
    rebuilt.renumber_objects();

    save(&mut rebuilt)
}

fn save(doc: &mut Document) -> Result<Vec<u8>, BackendError> {
    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| BackendError::Pdf(format!("Failed to save PDF: {e}")))?;
    Ok(output)
}

/// Geometry of one page as read back from a serialized document.
#[derive(Debug, Clone, PartialEq)]
pub struct PageGeometry {
    /// `[llx, lly, urx, ury]` in points.
    pub media_box: [f32; 4],
    /// Pixel size of the first image XObject on the page, if any.
    pub image: Option<Dimensions>,
    /// Operands of the first `cm` operator: `[a, b, c, d, e, f]`.
    pub transform: Option<[f32; 6]>,
}

/// Inspect every page of a PDF: media box, embedded image size, placement.
pub fn page_geometry(bytes: &[u8]) -> Result<Vec<PageGeometry>, BackendError> {
    let doc = Document::load_mem(bytes).map_err(|e| pdf_err("Failed to load PDF", e))?;
    let mut pages = Vec::new();

    for (_, page_id) in doc.get_pages() {
        let dict = doc
            .get_dictionary(page_id)
            .map_err(|e| pdf_err("Failed to read page", e))?;

        let media = dict
            .get(b"MediaBox")
            .and_then(Object::as_array)
            .map_err(|e| pdf_err("Page has no MediaBox", e))?;
        let mut media_box = [0.0f32; 4];
        for (slot, value) in media_box.iter_mut().zip(media) {
            *slot = value.as_float().map_err(|e| pdf_err("Bad MediaBox", e))?;
        }

        let image = first_image_size(&doc, dict);

        let transform = doc
            .get_page_content(page_id)
            .ok()
            .and_then(|raw| Content::decode(&raw).ok())
            .and_then(|content| {
                let cm = content.operations.into_iter().find(|op| op.operator == "cm")?;
                let mut values = [0.0f32; 6];
                for (slot, operand) in values.iter_mut().zip(&cm.operands) {
                    *slot = operand.as_float().ok()?;
                }
                Some(values)
            });

        pages.push(PageGeometry {
            media_box,
            image,
            transform,
        });
    }

    Ok(pages)
}

/// Pixel size of the first `/XObject` referenced from a page's resources.
fn first_image_size(doc: &Document, page: &Dictionary) -> Option<Dimensions> {
    let resources = match page.get(b"Resources").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok()?,
        Object::Dictionary(dict) => dict,
        _ => return None,
    };
    let xobjects = resources.get(b"XObject").and_then(Object::as_dict).ok()?;
    let (_, reference) = xobjects.iter().next()?;
    let stream = doc.get_object(reference.as_reference().ok()?).ok()?.as_stream().ok()?;
    let width = stream.dict.get(b"Width").and_then(Object::as_i64).ok()?;
    let height = stream.dict.get(b"Height").and_then(Object::as_i64).ok()?;
    Some(Dimensions {
        width: u32::try_from(width).ok()?,
        height: u32::try_from(height).ok()?,
    })
}
