//! Page-level document assembly: extracting a page range and concatenating documents.

use crate::{inherited, load_document, PdfEngineError};
use lopdf::{Document, Object, ObjectId};

/// Attributes a page may inherit from its `/Pages` ancestors.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Keeps pages `first..=last` (zero-based) and drops everything else.
pub fn split(bytes: &[u8], first: u32, last: u32) -> Result<Vec<u8>, PdfEngineError> {
    let mut doc = load_document(bytes)?;
    let page_count = doc.get_pages().len() as u32;

    if first > last {
        return Err(PdfEngineError::Backend(format!("empty page range {first}..={last}")));
    }
    if last >= page_count {
        return Err(PdfEngineError::PageOutOfRange { page: last, page_count });
    }

    // lopdf numbers pages from 1.
    let dropped: Vec<u32> =
        (1..=page_count).filter(|number| *number <= first || *number > last + 1).collect();
    doc.delete_pages(&dropped);
    doc.prune_objects();

    log::info!("split kept pages {}..={} of {page_count}", first + 1, last + 1);
    save(doc)
}

/// Concatenates documents in order.
pub fn merge(sources: &[Vec<u8>]) -> Result<Vec<u8>, PdfEngineError> {
    let Some((head, rest)) = sources.split_first() else {
        return Err(PdfEngineError::Backend("nothing to merge".to_owned()));
    };

    let mut merged = load_document(head)?;
    for bytes in rest {
        let next = load_document(bytes)?;
        append(&mut merged, next)?;
    }
    merged.prune_objects();

    log::info!("merged {} document(s) into {} page(s)", sources.len(), merged.get_pages().len());
    save(merged)
}

fn append(primary: &mut Document, mut secondary: Document) -> Result<(), PdfEngineError> {
    secondary.renumber_objects_with(primary.max_id + 1);
    let page_ids: Vec<ObjectId> = secondary.page_iter().collect();

    // Pages are re-parented below, so inherited attributes must be copied first.
    for page_id in &page_ids {
        let copied: Vec<(&[u8], Object)> = INHERITABLE
            .iter()
            .filter_map(|key| inherited(&secondary, *page_id, key).map(|obj| (*key, obj.clone())))
            .collect();
        let page = secondary.get_object_mut(*page_id).and_then(Object::as_dict_mut)?;
        for (key, value) in copied {
            if !page.has(key) {
                page.set(key, value);
            }
        }
    }

    primary.max_id = primary.max_id.max(secondary.max_id);
    primary.objects.extend(secondary.objects);

    let pages_root = primary.catalog()?.get(b"Pages").and_then(Object::as_reference)?;
    let pages = primary.get_object_mut(pages_root).and_then(Object::as_dict_mut)?;
    let kids = pages.get_mut(b"Kids").and_then(Object::as_array_mut)?;
    kids.extend(page_ids.iter().map(|id| Object::Reference(*id)));
    let count = pages.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
    pages.set("Count", count + page_ids.len() as i64);

    for page_id in page_ids {
        let page = primary.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
        page.set("Parent", Object::Reference(pages_root));
    }
    Ok(())
}

fn save(mut doc: Document) -> Result<Vec<u8>, PdfEngineError> {
    let mut output = Vec::new();
    doc.save_to(&mut output)?;
    Ok(output)
}
