//! LibXML2 FFI wrapper for XML Schema compilation and validation.
//!
//! No mature pure Rust XSD validator exists, so schema conformance goes through libxml2.
//! Well-formedness and the semantic checks use an owned tree built elsewhere (see `document`);
//! this module only deals with compiled schemas.
//!
//! ## Thread safety
//!
//! - **Schema parsing** is NOT thread-safe in libxml2 and is serialized behind `SCHEMA_PARSE_LOCK`.
//!   In practice schemas are compiled once at startup.
//! - **Validation** is thread-safe for different documents: every call creates its own
//!   validation context, while the compiled schema is shared read-only through an `Arc`.

use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex, Once};

use libc::{c_char, c_int, c_uint};

use crate::error::{LibXml2Error, LibXml2Result};

static LIBXML2_INIT: Once = Once::new();

static SCHEMA_PARSE_LOCK: Mutex<()> = Mutex::new(());

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

#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();
    pub fn xmlInitGlobals();

    pub fn xmlSchemaNewParserCtxt(url: *const c_char) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaNewMemParserCtxt(
        buffer: *const c_char,
        size: c_int,
    ) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaSetParserStructuredErrors(
        ctxt: *mut XmlSchemaParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut libc::c_void,
    );
    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);

    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaValidateFile(
        ctxt: *const XmlSchemaValidCtxt,
        file_name: *const c_char,
        options: c_uint,
    ) -> c_int;
    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        sherr: XmlStructuredErrorFunc,
        ctx: *mut libc::c_void,
    );
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
    pub int2: c_int,
    pub ctxt: *mut libc::c_void,
    pub node: *mut libc::c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut libc::c_void, error: *mut xmlError)>;

/// One problem reported by libxml2, in the order libxml2 emitted it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    pub line: i32,
    /// libxml2 reports the column in `int2`; 0 when unknown
    pub column: i32,
    pub message: String,
}

unsafe extern "C" fn structured_error_callback(user_data: *mut libc::c_void, error: *mut xmlError) {
    if user_data.is_null() || error.is_null() {
        return;
    }
    let issues = unsafe { &mut *(user_data as *mut Vec<SchemaIssue>) };
    let error = unsafe { &*error };

    if error.message.is_null() {
        return;
    }
    let message = unsafe { CStr::from_ptr(error.message) }
        .to_string_lossy()
        .trim()
        .to_string();

    issues.push(SchemaIssue {
        line: error.line,
        column: error.int2,
        message,
    });
}

/// Shared, reference-counted handle to a compiled schema
#[derive(Debug, Clone)]
pub struct XmlSchemaPtr {
    inner: Arc<XmlSchemaInner>,
}

#[derive(Debug)]
struct XmlSchemaInner {
    ptr: *mut XmlSchema,
    _phantom: PhantomData<XmlSchema>,
}

// Safety: compiled xmlSchema structures are read-only after parsing and libxml2
// documents them as safe for concurrent validation.
unsafe impl Send for XmlSchemaInner {}
unsafe impl Sync for XmlSchemaInner {}

impl XmlSchemaPtr {
    /// # Safety
    ///
    /// `ptr` must come from `xmlSchemaParse` and must not be freed elsewhere.
    unsafe fn from_raw(ptr: *mut XmlSchema, details: String) -> LibXml2Result<Self> {
        if ptr.is_null() {
            return Err(LibXml2Error::SchemaParseFailed { details });
        }

        Ok(XmlSchemaPtr {
            inner: Arc::new(XmlSchemaInner {
                ptr,
                _phantom: PhantomData,
            }),
        })
    }

    fn as_ptr(&self) -> *const XmlSchema {
        self.inner.ptr
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

/// Outcome of validating one file against a compiled schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid { issues: Vec<SchemaIssue> },
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn issues(&self) -> &[SchemaIssue] {
        match self {
            ValidationResult::Valid => &[],
            ValidationResult::Invalid { issues } => issues,
        }
    }
}

/// Safe entry point to libxml2
#[derive(Debug, Clone)]
pub struct LibXml2Wrapper {
    _phantom: PhantomData<()>,
}

impl LibXml2Wrapper {
    /// Initializes libxml2 on first use; cheap afterwards.
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
            xmlInitGlobals();
        });

        LibXml2Wrapper {
            _phantom: PhantomData,
        }
    }

    /// Compile a schema held in memory. Relative `xs:include`/`xs:import` locations cannot be
    /// resolved this way; use [`Self::parse_schema_from_file`] for local schema trees.
    pub fn parse_schema_from_memory(&self, schema_data: &[u8]) -> LibXml2Result<XmlSchemaPtr> {
        let size = c_int::try_from(schema_data.len()).map_err(|_| LibXml2Error::MemoryAllocation)?;
        let _guard = SCHEMA_PARSE_LOCK
            .lock()
            .map_err(|_| LibXml2Error::MemoryAllocation)?;

        unsafe {
            let parser_ctxt = xmlSchemaNewMemParserCtxt(schema_data.as_ptr() as *const c_char, size);
            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }
            Self::parse_with_context(parser_ctxt)
        }
    }

    /// Compile a schema from a local file, resolving includes relative to it
    pub fn parse_schema_from_file(&self, schema_path: &Path) -> LibXml2Result<XmlSchemaPtr> {
        let c_path = path_to_cstring(schema_path).ok_or_else(|| {
            LibXml2Error::SchemaParseFailed {
                details: format!("unsupported path {}", schema_path.display()),
            }
        })?;
        let _guard = SCHEMA_PARSE_LOCK
            .lock()
            .map_err(|_| LibXml2Error::MemoryAllocation)?;

        unsafe {
            let parser_ctxt = xmlSchemaNewParserCtxt(c_path.as_ptr());
            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }
            Self::parse_with_context(parser_ctxt)
        }
    }

    /// # Safety
    ///
    /// `parser_ctxt` must be a live parser context; it is freed here.
    unsafe fn parse_with_context(
        parser_ctxt: *mut XmlSchemaParserCtxt,
    ) -> LibXml2Result<XmlSchemaPtr> {
        let mut issues: Vec<SchemaIssue> = Vec::new();
        let issues_ptr = &mut issues as *mut Vec<SchemaIssue> as *mut libc::c_void;

        unsafe {
            xmlSchemaSetParserStructuredErrors(
                parser_ctxt,
                Some(structured_error_callback),
                issues_ptr,
            );
            let schema_ptr = xmlSchemaParse(parser_ctxt);
            xmlSchemaFreeParserCtxt(parser_ctxt);

            let details = issues
                .iter()
                .map(|issue| issue.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            XmlSchemaPtr::from_raw(schema_ptr, details)
        }
    }

    /// Validate a file on disk. Safe to call concurrently; each call owns its context.
    pub fn validate_file(
        &self,
        schema: &XmlSchemaPtr,
        file_path: &Path,
    ) -> LibXml2Result<ValidationResult> {
        let c_path = path_to_cstring(file_path).ok_or_else(|| LibXml2Error::ValidationFailed {
            code: -1,
            file: file_path.to_path_buf(),
        })?;

        unsafe {
            let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
            if valid_ctxt.is_null() {
                return Err(LibXml2Error::ValidationContextCreationFailed);
            }

            let mut issues: Vec<SchemaIssue> = Vec::new();
            let issues_ptr = &mut issues as *mut Vec<SchemaIssue> as *mut libc::c_void;
            xmlSchemaSetValidStructuredErrors(
                valid_ctxt,
                Some(structured_error_callback),
                issues_ptr,
            );

            let code = xmlSchemaValidateFile(valid_ctxt, c_path.as_ptr(), 0);
            xmlSchemaFreeValidCtxt(valid_ctxt);

            match code {
                0 => Ok(ValidationResult::Valid),
                n if n > 0 => Ok(ValidationResult::Invalid { issues }),
                n => Err(LibXml2Error::ValidationFailed {
                    code: n,
                    file: file_path.to_path_buf(),
                }),
            }
        }
    }
}

impl Default for LibXml2Wrapper {
    fn default() -> Self {
        Self::new()
    }
}

fn path_to_cstring(path: &Path) -> Option<CString> {
    path.to_str().and_then(|s| CString::new(s).ok())
}
