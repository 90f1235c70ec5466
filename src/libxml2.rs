//! LibXML2 FFI Wrapper Module
//!
//! Safe wrapper around the libxml2 calls needed to compile one XSD and validate many
//! documents against it.
//!
//! The Rust ecosystem still has no mature XML Schema validator (roxmltree, quick-xml
//! and xml-rs only parse), so schema work is delegated to libxml2 directly.
//!
//! ## Thread Safety
//!
//! - **Initialization**: `xmlInitParser` is not thread-safe and runs exactly once
//!   behind a `std::sync::Once`.
//! - **Schema parsing**: must be serialized. A batch compiles its schema once.
//! - **Validation**: each call creates its own parser context and its own
//!   validation context. The compiled schema is only read, so it is shared across
//!   threads through an `Arc`.
//!
//! ## Two-phase validation
//!
//! A document is first parsed into a tree with a private parser context. If that
//! fails the document is not well-formed (or not readable) and the caller gets
//! [`LibXml2Error::DocumentParseFailed`]; nothing reaches the error handler. Only a
//! parsed tree is handed to `xmlSchemaValidateDoc`, whose structured errors are
//! routed to the caller's [`ErrorHandler`].

use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Once};

use libc::{c_char, c_int, c_void};

use crate::engine::{ErrorHandler, Severity, ValidationError};
use crate::error::{LibXml2Error, LibXml2Result};

static LIBXML2_INIT: Once = Once::new();

/// Suppress error reports on stderr; the last error is still kept on the context.
const XML_PARSE_NOERROR: c_int = 1 << 5;
/// Suppress warning reports on stderr.
const XML_PARSE_NOWARNING: c_int = 1 << 6;
/// Forbid network access while loading documents.
const XML_PARSE_NONET: c_int = 1 << 11;
/// Lift the default text node (10 MB) and nesting depth (256) limits.
const XML_PARSE_HUGE: c_int = 1 << 19;

const DOCUMENT_PARSE_OPTIONS: c_int =
    XML_PARSE_NOERROR | XML_PARSE_NOWARNING | XML_PARSE_NONET | XML_PARSE_HUGE;

/// `xmlErrorLevel::XML_ERR_WARNING`
const XML_ERR_WARNING: c_int = 1;

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    /// Column number, when libxml2 knows it
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *const xmlError)>;

#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();
    pub fn xmlInitGlobals();

    // Schema parsing
    pub fn xmlSchemaNewParserCtxt(url: *const c_char) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaNewMemParserCtxt(
        buffer: *const c_char,
        size: c_int,
    ) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaSetParserStructuredErrors(
        ctxt: *mut XmlSchemaParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);

    // Schema validation
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaValidateDoc(ctxt: *mut XmlSchemaValidCtxt, doc: *mut XmlDoc) -> c_int;

    // Document parsing
    pub fn xmlNewParserCtxt() -> *mut XmlParserCtxt;
    pub fn xmlFreeParserCtxt(ctxt: *mut XmlParserCtxt);
    pub fn xmlCtxtReadFile(
        ctxt: *mut XmlParserCtxt,
        filename: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlCtxtGetLastError(ctx: *mut c_void) -> *const xmlError;
    pub fn xmlSetStructuredErrorFunc(ctx: *mut c_void, handler: XmlStructuredErrorFunc);
    pub fn xmlFreeDoc(doc: *mut XmlDoc);
}

/// Read the message of a libxml2 error, trimmed of the trailing newline
///
/// # Safety
///
/// `error` must be null or point to a live `xmlError`.
unsafe fn error_message(error: *const xmlError) -> Option<String> {
    if error.is_null() {
        return None;
    }
    let msg_ptr = unsafe { (*error).message };
    if msg_ptr.is_null() {
        return None;
    }
    let c_str = unsafe { CStr::from_ptr(msg_ptr) };
    Some(c_str.to_string_lossy().trim().to_string())
}

fn positive(value: c_int) -> Option<u32> {
    u32::try_from(value).ok().filter(|v| *v > 0)
}

/// Structured error callback for schema validation; `user_data` is a
/// `*mut &mut dyn ErrorHandler` owned by [`LibXml2Wrapper::validate_file`].
unsafe extern "C" fn validation_error_callback(user_data: *mut c_void, error: *const xmlError) {
    if user_data.is_null() || error.is_null() {
        return;
    }

    let handler = unsafe { &mut **(user_data as *mut &mut dyn ErrorHandler) };
    let raw = unsafe { &*error };
    let message = unsafe { error_message(error) }.unwrap_or_default();

    let issue = ValidationError {
        message,
        severity: Severity::from_level(raw.level),
        line: positive(raw.line),
        column: positive(raw.int2),
    };

    match issue.severity {
        Severity::Warning => handler.on_warning(issue),
        Severity::Error => handler.on_error(issue),
        Severity::Fatal => handler.on_fatal_error(issue),
    }
}

/// Structured error callback for schema parsing; collects messages into a `Vec<String>`
unsafe extern "C" fn schema_parser_error_callback(user_data: *mut c_void, error: *const xmlError) {
    if user_data.is_null() {
        return;
    }
    let diagnostics = unsafe { &mut *(user_data as *mut Vec<String>) };
    if let Some(message) = unsafe { error_message(error) } {
        diagnostics.push(message);
    }
}

/// Structured error callback for document parsing; keeps error and fatal
/// messages in a `Vec<String>`, in the order libxml2 raised them
unsafe extern "C" fn document_parse_error_callback(user_data: *mut c_void, error: *const xmlError) {
    if user_data.is_null() || error.is_null() {
        return;
    }
    if unsafe { (*error).level } <= XML_ERR_WARNING {
        return;
    }
    let diagnostics = unsafe { &mut *(user_data as *mut Vec<String>) };
    if let Some(message) = unsafe { error_message(error) } {
        diagnostics.push(message);
    }
}

/// Thread-safe wrapper for a compiled libxml2 schema
///
/// The schema is freed when the last clone is dropped.
#[derive(Debug)]
pub struct XmlSchemaPtr {
    inner: Arc<XmlSchemaInner>,
}

#[derive(Debug)]
struct XmlSchemaInner {
    ptr: *mut XmlSchema,
    _phantom: PhantomData<XmlSchema>,
}

// Safety: libxml2 documents compiled xmlSchema structures as safe to read from
// several threads. See http://xmlsoft.org/threads.html
unsafe impl Send for XmlSchemaInner {}
unsafe impl Sync for XmlSchemaInner {}

impl XmlSchemaPtr {
    /// # Safety
    ///
    /// The pointer must come from `xmlSchemaParse` and must not be freed elsewhere.
    pub(crate) unsafe fn from_raw(ptr: *mut XmlSchema, details: Vec<String>) -> LibXml2Result<Self> {
        if ptr.is_null() {
            let details = if details.is_empty() {
                "libxml2 returned no schema".to_string()
            } else {
                details.join("; ")
            };
            return Err(LibXml2Error::SchemaParseFailed { details });
        }

        Ok(XmlSchemaPtr {
            inner: Arc::new(XmlSchemaInner {
                ptr,
                _phantom: PhantomData,
            }),
        })
    }

    pub(crate) fn as_ptr(&self) -> *const XmlSchema {
        self.inner.ptr
    }

    pub fn is_valid(&self) -> bool {
        !self.inner.ptr.is_null()
    }
}

impl Clone for XmlSchemaPtr {
    fn clone(&self) -> Self {
        XmlSchemaPtr {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for XmlSchemaInner {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                xmlSchemaFree(self.ptr);
            }
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// Outcome of a schema validation pass over a well-formed document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationResult {
    /// libxml2 returned 0
    Valid,
    /// libxml2 returned a positive code; details went to the error handler
    Invalid { code: i32 },
}

impl ValidationResult {
    /// Map a libxml2 return code; negative codes are internal failures
    pub fn from_code(code: c_int) -> Option<Self> {
        match code {
            0 => Some(ValidationResult::Valid),
            n if n > 0 => Some(ValidationResult::Invalid { code: n }),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidationResult::Invalid { .. })
    }
}

/// Owns a parsed document tree for the duration of one validation
struct ParsedDocument(*mut XmlDoc);

impl Drop for ParsedDocument {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { xmlFreeDoc(self.0) };
        }
    }
}

/// Safe access to the libxml2 functionality used by the batch engine
pub struct LibXml2Wrapper {
    _phantom: PhantomData<()>,
}

impl LibXml2Wrapper {
    /// Initializes libxml2 on first use; later calls are no-ops.
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
            xmlInitGlobals();
        });

        LibXml2Wrapper {
            _phantom: PhantomData,
        }
    }

    /// Compile a schema held in memory.
    ///
    /// Relative `xs:include`/`xs:import` locations resolve against the working
    /// directory; use [`Self::parse_schema_from_file`] for schemas split over files.
    pub fn parse_schema_from_memory(&self, schema_data: &[u8]) -> LibXml2Result<XmlSchemaPtr> {
        let size = c_int::try_from(schema_data.len()).map_err(|_| LibXml2Error::MemoryAllocation)?;
        unsafe {
            let parser_ctxt = xmlSchemaNewMemParserCtxt(schema_data.as_ptr() as *const c_char, size);
            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }
            Self::parse_with_context(parser_ctxt)
        }
    }

    /// Compile a schema from a filesystem path, resolving includes relative to it.
    pub fn parse_schema_from_file(&self, schema_path: &Path) -> LibXml2Result<XmlSchemaPtr> {
        let c_path = path_to_cstring(schema_path)?;
        unsafe {
            let parser_ctxt = xmlSchemaNewParserCtxt(c_path.as_ptr());
            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }
            Self::parse_with_context(parser_ctxt)
        }
    }

    /// Parse and free `parser_ctxt`, collecting diagnostics on failure
    ///
    /// # Safety
    ///
    /// `parser_ctxt` must be a fresh, non-null schema parser context.
    unsafe fn parse_with_context(parser_ctxt: *mut XmlSchemaParserCtxt) -> LibXml2Result<XmlSchemaPtr> {
        let mut diagnostics: Vec<String> = Vec::new();
        unsafe {
            xmlSchemaSetParserStructuredErrors(
                parser_ctxt,
                Some(schema_parser_error_callback),
                &mut diagnostics as *mut Vec<String> as *mut c_void,
            );

            let schema_ptr = xmlSchemaParse(parser_ctxt);
            xmlSchemaFreeParserCtxt(parser_ctxt);

            XmlSchemaPtr::from_raw(schema_ptr, diagnostics)
        }
    }

    /// Validate one file against a compiled schema.
    ///
    /// Every warning, error, and fatal error libxml2 reports during schema
    /// validation is passed to `handler`. A file that cannot be read or is not
    /// well-formed returns [`LibXml2Error::DocumentParseFailed`] without touching
    /// the handler.
    ///
    /// Safe to call concurrently: the parser and validation contexts are private
    /// to this call and the schema is only read.
    pub fn validate_file(
        &self,
        schema: &XmlSchemaPtr,
        file_path: &Path,
        handler: &mut dyn ErrorHandler,
    ) -> LibXml2Result<ValidationResult> {
        let c_path = path_to_cstring(file_path)?;
        let document = self.read_document(&c_path, file_path)?;

        unsafe {
            let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
            if valid_ctxt.is_null() {
                return Err(LibXml2Error::ValidationContextCreationFailed);
            }

            let mut handler_ref: &mut dyn ErrorHandler = handler;
            xmlSchemaSetValidStructuredErrors(
                valid_ctxt,
                Some(validation_error_callback),
                &mut handler_ref as *mut &mut dyn ErrorHandler as *mut c_void,
            );

            let result_code = xmlSchemaValidateDoc(valid_ctxt, document.0);
            xmlSchemaFreeValidCtxt(valid_ctxt);

            ValidationResult::from_code(result_code).ok_or_else(|| LibXml2Error::InternalError {
                code: result_code,
                file: file_path.to_path_buf(),
            })
        }
    }

    /// Parse a document with errors routed away from stderr
    ///
    /// libxml2 keeps the structured error handler per thread, so it is
    /// installed on the calling thread for the duration of the read only.
    fn read_document(&self, c_path: &CString, file_path: &Path) -> LibXml2Result<ParsedDocument> {
        unsafe {
            let parser_ctxt = xmlNewParserCtxt();
            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }

            let mut diagnostics: Vec<String> = Vec::new();
            xmlSetStructuredErrorFunc(
                &mut diagnostics as *mut Vec<String> as *mut c_void,
                Some(document_parse_error_callback),
            );

            let doc = xmlCtxtReadFile(
                parser_ctxt,
                c_path.as_ptr(),
                std::ptr::null(),
                DOCUMENT_PARSE_OPTIONS,
            );

            xmlSetStructuredErrorFunc(std::ptr::null_mut(), None);

            let failure = if doc.is_null() {
                let details = diagnostics
                    .into_iter()
                    .next()
                    .or_else(|| error_message(xmlCtxtGetLastError(parser_ctxt as *mut c_void)))
                    .unwrap_or_else(|| "document could not be parsed".to_string());
                Some(details)
            } else {
                None
            };
            xmlFreeParserCtxt(parser_ctxt);

            match failure {
                Some(details) => Err(LibXml2Error::DocumentParseFailed {
                    file: file_path.to_path_buf(),
                    details,
                }),
                None => Ok(ParsedDocument(doc)),
            }
        }
    }
}

fn path_to_cstring(path: &Path) -> LibXml2Result<CString> {
    path.to_str()
        .and_then(|s| CString::new(s).ok())
        .ok_or_else(|| LibXml2Error::InvalidPath {
            file: path.to_path_buf(),
        })
}

impl Default for LibXml2Wrapper {
    fn default() -> Self {
        Self::new()
    }
}
