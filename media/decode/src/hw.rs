/*!
    Hardware acceleration support.
*/

use std::ffi::CString;
use std::os::raw::c_void;
use std::ptr;

use ffmpeg_next as ffmpeg;
use ffmpeg::ffi;

use media_types::{Error, Result};

/**
    Hardware device context plus the pixel format negotiated for it.

    The chosen format is owned here and published to the codec through its
    `opaque` pointer, where the format-selection callback reads it back —
    no global state is involved.
*/
pub(crate) struct HwAccel {
    device_ctx: *mut ffi::AVBufferRef,
    hw_pix_fmt: Box<ffi::AVPixelFormat>,
}

impl HwAccel {
    /**
        Probe the decoder for a config matching the named device type,
        create the device, and wire both onto the codec context. Must run
        before the context is opened.
    */
    pub(crate) fn attach(
        ctx: &mut ffmpeg::codec::context::Context,
        codec_id: ffmpeg::codec::Id,
        device_name: &str,
    ) -> Result<Self> {
        let c_name = CString::new(device_name)
            .map_err(|_| Error::invalid_data("hardware device name contains NUL"))?;
        let device_type = unsafe { ffi::av_hwdevice_find_type_by_name(c_name.as_ptr()) };
        if device_type == ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
            return Err(Error::unsupported_format(format!(
                "unknown hardware device type: {device_name}"
            )));
        }

        let codec = ffmpeg::decoder::find(codec_id)
            .ok_or_else(|| Error::codec(format!("no decoder for {codec_id:?}")))?;

        let hw_pix_fmt = unsafe {
            let mut pix_fmt = None;
            for i in 0.. {
                let config = ffi::avcodec_get_hw_config(codec.as_ptr(), i);
                if config.is_null() {
                    break;
                }
                let supports_device_ctx = (*config).methods as u32
                    & ffi::AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX as u32
                    != 0;
                if supports_device_ctx && (*config).device_type == device_type {
                    pix_fmt = Some((*config).pix_fmt);
                    break;
                }
            }
            pix_fmt.ok_or_else(|| {
                Error::unsupported_format(format!(
                    "decoder {} does not support device type {device_name}",
                    codec.name()
                ))
            })?
        };

        let mut device_ctx: *mut ffi::AVBufferRef = ptr::null_mut();
        let ret = unsafe {
            ffi::av_hwdevice_ctx_create(
                &mut device_ctx,
                device_type,
                ptr::null(),
                ptr::null_mut(),
                0,
            )
        };
        if ret < 0 || device_ctx.is_null() {
            return Err(Error::codec(format!(
                "hardware device initialization failed for {device_name} ({ret})"
            )));
        }

        let hw_pix_fmt = Box::new(hw_pix_fmt);
        unsafe {
            let raw = ctx.as_mut_ptr();
            (*raw).hw_device_ctx = ffi::av_buffer_ref(device_ctx);
            (*raw).opaque = &*hw_pix_fmt as *const ffi::AVPixelFormat as *mut c_void;
            (*raw).get_format = Some(select_hw_format);
        }

        Ok(Self {
            device_ctx,
            hw_pix_fmt,
        })
    }

    /// Whether a received frame surfaced in the device pixel format.
    pub(crate) fn is_hw_frame(&self, frame: &ffmpeg::frame::Video) -> bool {
        unsafe { (*frame.as_ptr()).format == *self.hw_pix_fmt as i32 }
    }
}

impl Drop for HwAccel {
    fn drop(&mut self) {
        if !self.device_ctx.is_null() {
            unsafe {
                ffi::av_buffer_unref(&mut self.device_ctx);
            }
        }
    }
}

// SAFETY: the FFmpeg buffer reference is internally reference-counted and
// the boxed pixel format is only read by the codec while the owning
// decoder is alive.
unsafe impl Send for HwAccel {}

/// Format-selection callback: picks the format the codec context's opaque
/// pointer names, falling back to NONE when the device format is absent.
unsafe extern "C" fn select_hw_format(
    ctx: *mut ffi::AVCodecContext,
    mut formats: *const ffi::AVPixelFormat,
) -> ffi::AVPixelFormat {
    let wanted = (*ctx).opaque as *const ffi::AVPixelFormat;
    while *formats != ffi::AVPixelFormat::AV_PIX_FMT_NONE {
        if !wanted.is_null() && *formats == *wanted {
            return *formats;
        }
        formats = formats.add(1);
    }
    ffi::AVPixelFormat::AV_PIX_FMT_NONE
}

/**
    Transfer a hardware frame into system memory, preserving frame
    properties (pts above all).
*/
pub(crate) fn transfer_frame(
    hw_frame: &ffmpeg::frame::Video,
) -> std::result::Result<ffmpeg::frame::Video, ffmpeg::Error> {
    unsafe {
        let mut sw_frame = ffmpeg::frame::Video::empty();
        let ret = ffi::av_hwframe_transfer_data(sw_frame.as_mut_ptr(), hw_frame.as_ptr(), 0);
        if ret < 0 {
            return Err(ffmpeg::Error::from(ret));
        }
        let ret = ffi::av_frame_copy_props(sw_frame.as_mut_ptr(), hw_frame.as_ptr());
        if ret < 0 {
            return Err(ffmpeg::Error::from(ret));
        }
        Ok(sw_frame)
    }
}
