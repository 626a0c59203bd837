use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::backend::{PdfBackend, check_page};
use crate::error::{AppError, AppResult};
use crate::render::Viewport;
use crate::surface::Surface;
use crate::text::{TextContent, TextItem};

const PAGE_SIZE: u32 = 300;

const PAD_BYTES: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

pub(crate) fn unique_temp_path(suffix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be after unix epoch")
        .as_nanos();

    let mut path = std::env::temp_dir();
    path.push(format!("pdfpeek_{suffix}_{}_{}", process::id(), nanos));
    path
}

pub(crate) fn build_pdf(page_texts: &[&str]) -> Vec<u8> {
    build_pdf_with_info(page_texts, &[])
}

pub(crate) fn build_pdf_with_info(page_texts: &[&str], info: &[(&str, &str)]) -> Vec<u8> {
    let page_streams: Vec<String> = page_texts
        .iter()
        .map(|text| {
            let escaped = escape_literal_string(text);
            format!("BT /F1 14 Tf 36 260 Td ({escaped}) Tj ET")
        })
        .collect();

    build_pdf_from_streams(&page_streams, info)
}

pub(crate) fn build_pdf_with_raw_streams(page_streams: &[&str]) -> Vec<u8> {
    let page_streams: Vec<String> = page_streams
        .iter()
        .map(|stream| (*stream).to_string())
        .collect();

    build_pdf_from_streams(&page_streams, &[])
}

fn build_pdf_from_streams(page_streams: &[String], info: &[(&str, &str)]) -> Vec<u8> {
    let page_streams = if page_streams.is_empty() {
        vec![String::new()]
    } else {
        page_streams.to_vec()
    };
    let page_count = page_streams.len();
    let page_ids: Vec<usize> = (0..page_count).map(|i| 4 + i * 2).collect();

    let mut objects = Vec::new();
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());

    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push(format!(
        "<< /Type /Pages /Kids [{kids}] /Count {page_count} >>"
    ));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());

    for (index, stream) in page_streams.iter().enumerate() {
        let content_id = 5 + index * 2;

        let page_obj = format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_SIZE} {PAGE_SIZE}] /Resources << /Font << /F1 3 0 R >> >> /Contents {content_id} 0 R >>"
        );
        let content_obj = format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            stream.len(),
            stream
        );

        objects.push(page_obj);
        objects.push(content_obj);
    }

    let info_ref = if info.is_empty() {
        String::new()
    } else {
        let entries = info
            .iter()
            .map(|(key, value)| format!("/{key} ({})", escape_literal_string(value)))
            .collect::<Vec<_>>()
            .join(" ");
        objects.push(format!("<< {entries} >>"));
        format!(" /Info {} 0 R", objects.len())
    };

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::new();
    offsets.push(0_usize);
    for (index, object) in objects.iter().enumerate() {
        let object_id = index + 1;
        offsets.push(bytes.len());
        bytes.extend_from_slice(format!("{object_id} 0 obj\n{object}\nendobj\n").as_bytes());
    }

    let xref_start = bytes.len();
    bytes.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    bytes.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets.iter().skip(1) {
        bytes.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }

    bytes.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R{info_ref} >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );

    bytes
}

fn escape_literal_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }

    out
}

pub(crate) const ENCRYPTED_TITLE: &str = "Locked Report";

/// One-page document encrypted with the standard security handler
/// (RC4, 40-bit, revision 2) under `user_password`. Its `/Info` carries
/// [`ENCRYPTED_TITLE`], encrypted like every other string.
pub(crate) fn build_encrypted_pdf(user_password: &[u8], page_text: &str) -> Vec<u8> {
    use lopdf::{Document, Object, Stream, StringFormat, dictionary};

    let file_id = b"pdfpeekfileid001";
    let permissions: i32 = -4;

    let mut padded_pw = Vec::with_capacity(32);
    let pw_len = user_password.len().min(32);
    padded_pw.extend_from_slice(&user_password[..pw_len]);
    padded_pw.extend_from_slice(&PAD_BYTES[..32 - pw_len]);

    let o_key_digest = md5::compute(&padded_pw);
    let o_value = rc4_transform(&o_key_digest[..5], &padded_pw);

    let mut key_input = Vec::with_capacity(128);
    key_input.extend_from_slice(&padded_pw);
    key_input.extend_from_slice(&o_value);
    key_input.extend_from_slice(&(permissions as u32).to_le_bytes());
    key_input.extend_from_slice(file_id);
    let key_digest = md5::compute(&key_input);
    let enc_key = key_digest[..5].to_vec();

    let u_value = rc4_transform(&enc_key, &PAD_BYTES);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let content = format!(
        "BT /F1 14 Tf 36 260 Td ({}) Tj ET",
        escape_literal_string(page_text)
    );
    let content_id = doc.add_object(Object::Stream(Stream::new(
        dictionary! {},
        content.into_bytes(),
    )));
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 300.into(), 300.into()],
        "Contents" => Object::Reference(content_id),
        "Resources" => dictionary! {
            "Font" => dictionary! {
                "F1" => Object::Reference(font_id),
            },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1_i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(ENCRYPTED_TITLE),
    });
    doc.trailer.set("Info", info_id);

    for (&obj_id, obj) in doc.objects.iter_mut() {
        let mut obj_key_input = Vec::with_capacity(10);
        obj_key_input.extend_from_slice(&enc_key);
        obj_key_input.extend_from_slice(&obj_id.0.to_le_bytes()[..3]);
        obj_key_input.extend_from_slice(&obj_id.1.to_le_bytes()[..2]);
        let obj_key_digest = md5::compute(&obj_key_input);
        let obj_key = &obj_key_digest[..(enc_key.len() + 5).min(16)];

        match obj {
            Object::Stream(stream) => {
                let encrypted = rc4_transform(obj_key, &stream.content);
                stream.set_content(encrypted);
            }
            Object::String(content, _) => {
                *content = rc4_transform(obj_key, content);
            }
            Object::Dictionary(dict) => {
                for (_, value) in dict.iter_mut() {
                    if let Object::String(content, _) = value {
                        *content = rc4_transform(obj_key, content);
                    }
                }
            }
            _ => {}
        }
    }

    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 1_i64,
        "R" => 2_i64,
        "Length" => 40_i64,
        "O" => Object::String(o_value, StringFormat::Literal),
        "U" => Object::String(u_value, StringFormat::Literal),
        "P" => permissions as i64,
    });
    doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
    doc.trailer.set(
        "ID",
        Object::Array(vec![
            Object::String(file_id.to_vec(), StringFormat::Literal),
            Object::String(file_id.to_vec(), StringFormat::Literal),
        ]),
    );

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .expect("encrypted test document should serialize");
    buf
}

fn rc4_transform(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut s: Vec<u8> = (0..=255).collect();
    let mut j = 0_usize;
    for i in 0..256 {
        j = (j + s[i] as usize + key[i % key.len()] as usize) & 0xFF;
        s.swap(i, j);
    }

    let mut out = Vec::with_capacity(data.len());
    let (mut i, mut j) = (0_usize, 0_usize);
    for &byte in data {
        i = (i + 1) & 0xFF;
        j = (j + s[i] as usize) & 0xFF;
        s.swap(i, j);
        out.push(byte ^ s[(s[i] as usize + s[j] as usize) & 0xFF]);
    }
    out
}

/// In-memory backend with one text run per page and solid white pages.
pub(crate) struct FakeBackend {
    pages: Vec<String>,
    pub(crate) text_requests: Arc<AtomicUsize>,
    pub(crate) fail_text_on: Option<usize>,
    pub(crate) fail_render_on: Option<usize>,
}

impl FakeBackend {
    pub(crate) const PAGE_SIZE: (f32, f32) = (200.0, 100.0);

    pub(crate) fn new(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|text| text.to_string()).collect(),
            text_requests: Arc::new(AtomicUsize::new(0)),
            fail_text_on: None,
            fail_render_on: None,
        }
    }
}

impl PdfBackend for FakeBackend {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_dimensions(&self, page: usize) -> AppResult<(f32, f32)> {
        check_page(page, self.pages.len())?;
        Ok(Self::PAGE_SIZE)
    }

    fn rasterize(&self, page: usize, viewport: &Viewport, surface: &mut dyn Surface) -> AppResult<()> {
        check_page(page, self.pages.len())?;
        if self.fail_render_on == Some(page) {
            return Err(AppError::parse(format!("broken page tree at page {page}")));
        }
        let pixels = vec![255; viewport.width as usize * viewport.height as usize * 4];
        surface.draw_rgba(viewport.width, viewport.height, &pixels)
    }

    fn text_content(&self, page: usize) -> AppResult<TextContent> {
        check_page(page, self.pages.len())?;
        self.text_requests.fetch_add(1, Ordering::SeqCst);
        if self.fail_text_on == Some(page) {
            return Err(AppError::parse(format!(
                "broken content stream on page {page}"
            )));
        }

        Ok(TextContent {
            items: vec![TextItem {
                text: self.pages[page - 1].clone(),
                x: 0.0,
                y: 0.0,
            }],
        })
    }
}
