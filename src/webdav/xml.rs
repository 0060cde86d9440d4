use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// Properties reported for one resource in a PROPFIND answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropEntry {
    pub href: String,
    pub display_name: String,
    pub etag: String,
    pub last_modified: String,
    /// `None` for collections
    pub content_length: Option<i64>,
    pub is_collection: bool,
}

const STATUS_OK: &str = "HTTP/1.1 200 OK";

/// Renders a `DAV:` multistatus document, one `response` per entry in order.
pub fn render_multistatus(entries: &[PropEntry]) -> quick_xml::Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("d:multistatus");
    root.push_attribute(("xmlns:d", "DAV:"));
    writer.write_event(Event::Start(root))?;

    for entry in entries {
        write_response(&mut writer, entry)?;
    }

    writer.write_event(Event::End(BytesEnd::new("d:multistatus")))?;
    Ok(writer.into_inner())
}

fn write_response(writer: &mut Writer<Vec<u8>>, entry: &PropEntry) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(BytesStart::new("d:response")))?;
    write_text_element(writer, "d:href", &entry.href)?;

    writer.write_event(Event::Start(BytesStart::new("d:propstat")))?;
    writer.write_event(Event::Start(BytesStart::new("d:prop")))?;

    write_text_element(writer, "d:displayname", &entry.display_name)?;
    write_text_element(writer, "d:getetag", &entry.etag)?;
    write_text_element(writer, "d:getlastmodified", &entry.last_modified)?;
    if let Some(length) = entry.content_length {
        write_text_element(writer, "d:getcontentlength", &length.to_string())?;
    }

    if entry.is_collection {
        writer.write_event(Event::Start(BytesStart::new("d:resourcetype")))?;
        writer.write_event(Event::Empty(BytesStart::new("d:collection")))?;
        writer.write_event(Event::End(BytesEnd::new("d:resourcetype")))?;
    } else {
        writer.write_event(Event::Empty(BytesStart::new("d:resourcetype")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("d:prop")))?;
    write_text_element(writer, "d:status", STATUS_OK)?;
    writer.write_event(Event::End(BytesEnd::new("d:propstat")))?;

    writer.write_event(Event::End(BytesEnd::new("d:response")))?;
    Ok(())
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    // Quotes stay literal so ETags read naturally
    writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(text))))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_entry() -> PropEntry {
        PropEntry {
            href: "/dav/a/b.txt".to_string(),
            display_name: "b.txt".to_string(),
            etag: "\"abc\"".to_string(),
            last_modified: "Tue, 14 Nov 2023 22:13:20 GMT".to_string(),
            content_length: Some(42),
            is_collection: false,
        }
    }

    #[test]
    fn test_renders_file_response() {
        let xml = String::from_utf8(render_multistatus(&[file_entry()]).unwrap()).unwrap();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"<d:multistatus xmlns:d="DAV:">"#));
        assert!(xml.contains("<d:href>/dav/a/b.txt</d:href>"));
        assert!(xml.contains("<d:displayname>b.txt</d:displayname>"));
        assert!(xml.contains(r#"<d:getetag>"abc"</d:getetag>"#));
        assert!(xml.contains("<d:getcontentlength>42</d:getcontentlength>"));
        assert!(xml.contains("<d:resourcetype/>"));
        assert!(xml.contains("<d:status>HTTP/1.1 200 OK</d:status>"));
        assert!(!xml.contains("<d:collection/>"));
    }

    #[test]
    fn test_renders_collection_without_length() {
        let entry = PropEntry {
            href: "/dav/a/".to_string(),
            display_name: "a".to_string(),
            content_length: None,
            is_collection: true,
            ..file_entry()
        };
        let xml = String::from_utf8(render_multistatus(&[entry]).unwrap()).unwrap();

        assert!(xml.contains("<d:resourcetype><d:collection/></d:resourcetype>"));
        assert!(!xml.contains("getcontentlength"));
    }

    #[test]
    fn test_escapes_text() {
        let entry = PropEntry {
            display_name: "Tom & Jerry <1>.mkv".to_string(),
            ..file_entry()
        };
        let xml = String::from_utf8(render_multistatus(&[entry]).unwrap()).unwrap();

        assert!(xml.contains("<d:displayname>Tom &amp; Jerry &lt;1&gt;.mkv</d:displayname>"));
    }

    #[test]
    fn test_one_response_per_entry() {
        let xml = String::from_utf8(render_multistatus(&[file_entry(), file_entry(), file_entry()]).unwrap()).unwrap();
        assert_eq!(xml.matches("<d:response>").count(), 3);
    }
}
