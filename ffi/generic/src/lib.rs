#![allow(clippy::missing_safety_doc)]

use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr::null_mut;

use nfctag::nfc::{CloseError, LinkError, TransceiveError, Transceiver};
use nfctag::session::WriteRequest;
use nfctag::tech::{NfcAParams, Tag, TechList};
use nfctag::{BlockData, Card, Key, Report, Session};

/// Longest response to a short APDU: 256 bytes of data and two status bytes.
const MAX_RESPONSE_LEN: usize = 258;

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = RefCell::new(None);
}

/// Remembers the failure of a report, or clears the last error if it succeeded.
fn record(report: &Report) {
    let error = match report.is_ok() {
        true => None,
        _ => report.lines().last().cloned(),
    };

    LAST_ERROR.with(|last| *last.borrow_mut() = error);
}

fn into_c_string(message: String) -> *mut c_char {
    match CString::new(message.replace('\0', "")) {
        Ok(str) => str.into_raw(),
        Err(_) => null_mut(),
    }
}

unsafe fn bytes_or_empty<'a>(ptr: *const c_char) -> &'a [u8] {
    match ptr.is_null() {
        true => &[],
        _ => CStr::from_ptr(ptr).to_bytes(),
    }
}

unsafe fn tech_list(names: *const *const c_char, len: usize) -> TechList {
    if names.is_null() {
        return TechList::default();
    }

    TechList::from_names(
        std::slice::from_raw_parts(names, len)
            .iter()
            .map(|&name| String::from_utf8_lossy(bytes_or_empty(name)).into_owned()),
    )
}

/// Callbacks through which the library talks to the tag.
/// Every callback receives `user_data` untouched.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct Link {
    pub user_data: *mut c_void,

    /// Returns true while the link to the tag is open.
    pub is_connected: extern "C" fn(*mut c_void) -> bool,

    /// Opens the link to the tag. Returns false on failure.
    pub connect: extern "C" fn(*mut c_void) -> bool,

    /// Sends `command_len` bytes at `command` to the tag, then copies its response into
    /// `response`, which has room for `response_cap` bytes.
    /// Returns the length of the response, or a negative value on failure.
    pub transceive: extern "C" fn(*mut c_void, *const u8, usize, *mut u8, usize) -> isize,

    /// Releases the link to the tag. Returns false on failure.
    pub close: extern "C" fn(*mut c_void) -> bool,
}

impl Transceiver for Link {
    fn is_connected(&self, _: ()) -> bool {
        (self.is_connected)(self.user_data)
    }

    fn connect(&mut self, _: ()) -> Result<(), LinkError> {
        match (self.connect)(self.user_data) {
            true => Ok(()),
            _ => Err(LinkError::new("the host could not connect to the tag")),
        }
    }

    fn transceive(&mut self, _: (), command: &[u8]) -> Result<Vec<u8>, TransceiveError> {
        let mut response = vec![0u8; MAX_RESPONSE_LEN];
        let len = (self.transceive)(
            self.user_data,
            command.as_ptr(),
            command.len(),
            response.as_mut_ptr(),
            response.len(),
        );

        match usize::try_from(len) {
            Ok(len) if len <= response.len() => {
                response.truncate(len);
                Ok(response)
            }
            _ => Err(TransceiveError::new("the host could not transceive")),
        }
    }

    fn close(&mut self, _: ()) -> Result<(), CloseError> {
        match (self.close)(self.user_data) {
            true => Ok(()),
            _ => Err(CloseError::new("the host could not close the tag")),
        }
    }
}

/// Prepares the library. Call it once before any other function.
/// It has nothing to set up yet.
#[no_mangle]
pub extern "C" fn nfctag_init() {}

/// Returns the latest error occurred before calling this function.
/// If no error occurred before or failed to get the error, returns null pointer.
/// The string must be released with `nfctag_string_free`.
#[no_mangle]
pub extern "C" fn nfctag_last_error() -> *mut c_char {
    match LAST_ERROR.with(|last| last.borrow().clone()) {
        Some(message) => into_c_string(message),
        None => null_mut(),
    }
}

/// Releases a string returned by this library.
#[no_mangle]
pub unsafe extern "C" fn nfctag_string_free(str: *mut c_char) {
    if !str.is_null() {
        let _ = CString::from_raw(str);
    }
}

/// Writes `data` into `block` of the tag, authenticating with `key` (hex, empty for the default).
/// `data` is cut or zero-padded to 16 bytes.
/// `techs` lists the `techs_len` technology names the tag reported.
/// Returns the report, one line per event; the string must be released with `nfctag_string_free`.
#[no_mangle]
pub unsafe extern "C" fn nfctag_write(
    link: Link,
    techs: *const *const c_char,
    techs_len: usize,
    key: *const c_char,
    data: *const c_char,
    block: u8,
) -> *mut c_char {
    let tag = Tag::new(Vec::new(), tech_list(techs, techs_len));
    let key = String::from_utf8_lossy(bytes_or_empty(key));

    let report = match Key::from_hex(&key) {
        Ok(key) => {
            let request = WriteRequest {
                block,
                key,
                data: BlockData::pad_or_trim(bytes_or_empty(data)),
            };

            Session::new(Card::new(link)).write_tag((), &tag, &request)
        }
        Err(e) => Report::failed(format!("Write error: {}", e)),
    };

    record(&report);
    into_c_string(report.to_string())
}

/// Reads every sector of the tag with `key` (hex, empty for the default).
/// `atqa` and `sak` are the NfcA parameters of the tag, with the first ATQA byte in the high
/// half of `atqa`. Pass a negative `sak` when they are unknown.
/// Returns the report, one line per event; the string must be released with `nfctag_string_free`.
#[no_mangle]
pub unsafe extern "C" fn nfctag_read(
    link: Link,
    techs: *const *const c_char,
    techs_len: usize,
    key: *const c_char,
    atqa: u16,
    sak: i16,
) -> *mut c_char {
    let mut tag = Tag::new(Vec::new(), tech_list(techs, techs_len));
    if let Ok(sak) = u8::try_from(sak) {
        tag = tag.with_nfca(NfcAParams {
            atqa: atqa.to_be_bytes(),
            sak,
        });
    }

    let key = String::from_utf8_lossy(bytes_or_empty(key));
    let report = match Key::from_hex(&key) {
        Ok(key) => Session::new(Card::new(link)).read_tag((), &tag, &key),
        Err(e) => Report::failed(format!("Read error: {}", e)),
    };

    record(&report);
    into_c_string(report.to_string())
}
