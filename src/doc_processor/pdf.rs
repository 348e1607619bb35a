use super::ExtractionError;

/// Extract the text of every page, in page order.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractionError::PdfParsing(e.to_string()))
}

/// Concatenate page texts. Returns `None` when the document holds no
/// readable text at all.
pub fn join_pages(pages: &[String]) -> Option<String> {
    let text = pages.concat();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_concatenate_in_order() {
        let pages = vec!["Page one. ".to_string(), String::new(), "Page three.".to_string()];
        assert_eq!(join_pages(&pages).as_deref(), Some("Page one. Page three."));
    }

    #[test]
    fn test_all_empty_pages_yield_none() {
        let pages = vec![String::new(), "\n".to_string(), "  ".to_string()];
        assert_eq!(join_pages(&pages), None);
        assert_eq!(join_pages(&[]), None);
    }

    #[test]
    fn test_garbage_bytes_error() {
        assert!(extract_pages(b"%PDF-1.4 truncated").is_err());
    }
}
