#![allow(dead_code)]

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#;

/// XML escape for fixture text.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn document_xml(paragraphs: &[&str]) -> String {
    let mut body = String::new();
    for paragraph in paragraphs {
        body.push_str(&format!(
            r#"<w:p><w:pPr><w:pStyle w:val="Normal"/></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
            escape(paragraph)
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}<w:sectPr/></w:body></w:document>"#
    )
}

pub fn slide_xml(lines: &[&str]) -> String {
    let mut shapes = String::new();
    for line in lines {
        shapes.push_str(&format!(
            r#"<p:sp><p:txBody><a:bodyPr/><a:p><a:r><a:rPr lang="en-US"/><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp>"#,
            escape(line)
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree>{shapes}</p:spTree></p:cSld></p:sld>"#
    )
}

/// Write a zip container from `(name, content)` entries.
pub fn write_container(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).expect("Failed to create fixture");
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, content) in entries {
        zip.start_file(*name, options).expect("Failed to start entry");
        zip.write_all(content).expect("Failed to write entry");
    }
    zip.finish().expect("Failed to finish fixture");
}

pub fn write_docx(path: &Path, paragraphs: &[&str]) -> PathBuf {
    write_docx_xml(path, &document_xml(paragraphs))
}

pub fn write_docx_xml(path: &Path, document: &str) -> PathBuf {
    write_container(
        path,
        &[
            ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
            ("word/document.xml", document.as_bytes()),
            ("word/styles.xml", b"<w:styles/>"),
        ],
    );
    path.to_path_buf()
}

/// Write a document of `count` identical paragraphs without building the body
/// in memory. Returns the uncompressed size of the body part.
pub fn write_large_docx(path: &Path, paragraph: &str, count: usize) -> u64 {
    let (head, tail) = {
        let xml = document_xml(&[]);
        let split = xml.find("<w:sectPr/>").expect("Body marker missing");
        (xml[..split].to_string(), xml[split..].to_string())
    };
    let run = document_xml(&[paragraph]);
    let run = &run[head.len()..run.len() - tail.len()];

    let file = File::create(path).expect("Failed to create fixture");
    let mut zip = ZipWriter::new(std::io::BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file("[Content_Types].xml", options).expect("Failed to start entry");
    zip.write_all(CONTENT_TYPES.as_bytes()).expect("Failed to write entry");
    zip.start_file("word/document.xml", options).expect("Failed to start entry");
    zip.write_all(head.as_bytes()).expect("Failed to write entry");
    for _ in 0..count {
        zip.write_all(run.as_bytes()).expect("Failed to write entry");
    }
    zip.write_all(tail.as_bytes()).expect("Failed to write entry");
    zip.finish().expect("Failed to finish fixture");

    (head.len() + run.len() * count + tail.len()) as u64
}

/// Write a presentation whose slides are given in order, numbered from 1.
pub fn write_pptx(path: &Path, slides: &[&[&str]]) -> PathBuf {
    let slide_xml: Vec<(String, String)> = slides
        .iter()
        .enumerate()
        .map(|(i, lines)| (format!("ppt/slides/slide{}.xml", i + 1), slide_xml(lines)))
        .collect();

    let mut entries: Vec<(&str, &[u8])> = vec![
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("ppt/presentation.xml", b"<p:presentation/>"),
    ];
    for (name, xml) in &slide_xml {
        entries.push((name.as_str(), xml.as_bytes()));
    }
    write_container(path, &entries);
    path.to_path_buf()
}

/// Read one entry of a container as a string.
pub fn read_entry(path: &Path, name: &str) -> String {
    let file = File::open(path).expect("Failed to open container");
    let mut archive = ZipArchive::new(file).expect("Failed to read container");
    let mut entry = archive.by_name(name).expect("Missing entry");
    let mut content = String::new();
    entry.read_to_string(&mut content).expect("Entry is not UTF-8");
    content
}

/// Entry names of a container, in archive order.
pub fn entry_names(path: &Path) -> Vec<String> {
    let file = File::open(path).expect("Failed to open container");
    let archive = ZipArchive::new(file).expect("Failed to read container");
    archive.file_names().map(str::to_string).collect()
}

/// Paths left in `dir` that look like staging files.
pub fn leftover_temp_files(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .map(|e| e.into_path())
        .collect()
}
