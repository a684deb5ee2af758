#![allow(clippy::missing_safety_doc)]

#[macro_use]
extern crate log;
extern crate android_log;

use std::cell::RefCell;

use jni::objects::{GlobalRef, JClass, JObject, JString, JValue};
use jni::sys::{jbyteArray, jobjectArray, jshort, jstring};
use jni::JNIEnv;

use nfctag::key::BlockData;
use nfctag::nfc::{CloseError, LinkError, TransceiveError, Transceiver};
use nfctag::session::WriteRequest;
use nfctag::tech::{NfcAParams, Tag, TechList};
use nfctag::{Card, Key, Report, Session};

const NULL: jstring = 0 as jstring;

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = RefCell::new(None);
}

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error("JNI Error: {0}")]
    Jni(#[from] jni::errors::Error),

    #[error("Java exception thrown in {0}")]
    Exception(&'static str),

    #[error("{0}")]
    Key(#[from] nfctag::key::KeyError),
}

/// A `dev.nfctag.ffi.Transceiver` living on the Java side, typically wrapping `IsoDep`.
struct JniTransceiver {
    delegate: GlobalRef,
}

#[derive(Copy, Clone)]
struct JniContext<'a> {
    env: JNIEnv<'a>,
}

impl JniTransceiver {
    pub fn new(delegate: GlobalRef) -> Self {
        Self { delegate }
    }

    fn call<'a>(
        &'a self,
        ctx: JniContext<'a>,
        name: &'static str,
        sig: &str,
        args: &[JValue],
    ) -> Result<JValue<'a>, Error> {
        let res = ctx.env.call_method(self.delegate.as_obj(), name, sig, args);

        // A Java exception must be cleared before the env is used again.
        if ctx.env.exception_check().unwrap_or(false) {
            let _ = ctx.env.exception_describe();
            let _ = ctx.env.exception_clear();
            error!("{} threw an exception", name);

            return Err(Error::Exception(name));
        }

        res.map_err(|e| {
            error!("{} Error: {:?}", name, e);
            Error::Jni(e)
        })
    }
}

impl<'a> Transceiver<JniContext<'a>> for JniTransceiver {
    fn is_connected(&self, ctx: JniContext<'a>) -> bool {
        self.call(ctx, "isConnected", "()Z", &[])
            .and_then(|value| value.z().map_err(Error::Jni))
            .unwrap_or(false)
    }

    fn connect(&mut self, ctx: JniContext<'a>) -> Result<(), LinkError> {
        self.call(ctx, "connect", "()V", &[])
            .map(|_| ())
            .map_err(LinkError::new)
    }

    fn transceive(
        &mut self,
        ctx: JniContext<'a>,
        command: &[u8],
    ) -> Result<Vec<u8>, TransceiveError> {
        let array = ctx
            .env
            .byte_array_from_slice(command)
            .map_err(TransceiveError::new)?;
        let arg = JValue::Object(unsafe { JObject::from_raw(array) });

        let response = self
            .call(ctx, "transceive", "([B)[B", &[arg])
            .and_then(|value| value.l().map_err(Error::Jni))
            .map_err(TransceiveError::new)?;

        if response.is_null() {
            return Err(TransceiveError::new("transceive returned null"));
        }

        let bytes = ctx
            .env
            .convert_byte_array(response.into_raw())
            .map_err(TransceiveError::new)?;
        debug!("APDU Response Received: {:02X?}", bytes);

        Ok(bytes)
    }

    fn close(&mut self, ctx: JniContext<'a>) -> Result<(), CloseError> {
        self.call(ctx, "close", "()V", &[])
            .map(|_| ())
            .map_err(CloseError::new)
    }
}

fn set_last_error(error: Option<String>) {
    LAST_ERROR.with(|last| *last.borrow_mut() = error);
}

/// Remembers the failure of a report, or clears the last error if it succeeded.
fn record(report: &Report) {
    set_last_error(match report.is_ok() {
        true => None,
        _ => report.lines().last().cloned(),
    });
}

fn unwrap_or_null(env: JNIEnv, result: Result<Report, Error>) -> jstring {
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            set_last_error(Some(e.to_string()));
            return NULL;
        }
    };

    record(&report);
    match env.new_string(report.to_string()) {
        Ok(str) => str.into_raw(),
        Err(e) => {
            set_last_error(Some(Error::Jni(e).to_string()));
            NULL
        }
    }
}

fn jstring_to_string(env: JNIEnv, str: jstring) -> Result<String, Error> {
    if str.is_null() {
        return Ok(String::new());
    }

    Ok(env.get_string(unsafe { JString::from_raw(str) })?.into())
}

fn tech_list(env: JNIEnv, techs: jobjectArray) -> Result<TechList, Error> {
    if techs.is_null() {
        return Ok(TechList::default());
    }

    let len = env.get_array_length(techs)?;
    let names = (0..len)
        .map(|i| {
            let name = env.get_object_array_element(techs, i)?;
            jstring_to_string(env, name.into_raw())
        })
        .collect::<Result<Vec<_>, Error>>()?;

    Ok(TechList::from_names(names))
}

fn session<'a>(
    env: JNIEnv<'a>,
    transceiver: JObject<'a>,
) -> Result<Session<JniTransceiver, JniContext<'a>>, Error> {
    let global_ref = env.new_global_ref(transceiver)?;

    Ok(Session::new(Card::new(JniTransceiver::new(global_ref))))
}

#[no_mangle]
pub extern "C" fn Java_dev_nfctag_ffi_LibNfcTag_init() {
    if android_log::init("NfcTag.FFI").is_err() {
        warn!("Logger was already initialised");
    }
}

#[no_mangle]
pub extern "C" fn Java_dev_nfctag_ffi_LibNfcTag_lastError(env: JNIEnv, _class: JClass) -> jstring {
    match LAST_ERROR.with(|last| last.borrow().clone()) {
        Some(message) => env
            .new_string(message)
            .map(JString::into_raw)
            .unwrap_or(NULL),
        None => NULL,
    }
}

/// Writes `data` into the default block of the tag behind `transceiver`.
/// Returns the report, or null with `lastError` set if the arguments could not be read.
#[no_mangle]
pub extern "C" fn Java_dev_nfctag_ffi_LibNfcTag_write(
    env: JNIEnv,
    _class: JClass,
    transceiver: JObject,
    techs: jobjectArray,
    key: jstring,
    data: jstring,
) -> jstring {
    let result = (|| -> Result<Report, Error> {
        let ctx = JniContext { env };
        let tag = Tag::new(Vec::new(), tech_list(env, techs)?);
        let request = WriteRequest {
            key: Key::from_hex(&jstring_to_string(env, key)?)?,
            data: BlockData::from_text(&jstring_to_string(env, data)?),
            ..Default::default()
        };

        Ok(session(env, transceiver)?.write_tag(ctx, &tag, &request))
    })();

    unwrap_or_null(env, result)
}

/// Reads every sector of the tag behind `transceiver`.
/// `atqa` and `sak` come from `NfcA`; pass null and a negative `sak` when the tag has no NfcA.
#[no_mangle]
pub extern "C" fn Java_dev_nfctag_ffi_LibNfcTag_read(
    env: JNIEnv,
    _class: JClass,
    transceiver: JObject,
    techs: jobjectArray,
    key: jstring,
    atqa: jbyteArray,
    sak: jshort,
) -> jstring {
    let result = (|| -> Result<Report, Error> {
        let ctx = JniContext { env };
        let mut tag = Tag::new(Vec::new(), tech_list(env, techs)?);

        if let (false, Ok(sak)) = (atqa.is_null(), u8::try_from(sak)) {
            let bytes = env.convert_byte_array(atqa)?;
            tag = tag.with_nfca(NfcAParams {
                atqa: [
                    bytes.first().copied().unwrap_or_default(),
                    bytes.get(1).copied().unwrap_or_default(),
                ],
                sak,
            });
        }

        let key = Key::from_hex(&jstring_to_string(env, key)?)?;

        Ok(session(env, transceiver)?.read_tag(ctx, &tag, &key))
    })();

    unwrap_or_null(env, result)
}
