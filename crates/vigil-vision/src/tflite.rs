use anyhow::{anyhow, Result};
use image::{imageops::FilterType, RgbImage};
use std::{ffi::CString, os::raw::{c_char, c_int, c_void}, ptr, sync::Mutex};
use tracing::{debug, info};

use crate::{nms_filter, postprocess_ultralytics, postprocess_yolov8, Detector, RawDetection, VisionConfig};

#[repr(C)]
struct TfLiteModel;
#[repr(C)]
struct TfLiteInterpreterOptions;
#[repr(C)]
struct TfLiteInterpreter;
#[repr(C)]
struct TfLiteTensor;
#[repr(C)]
struct TfLiteDelegate;

#[link(name = "tensorflowlite_c")]
extern "C" {
    fn TfLiteModelCreateFromFile(model_path: *const c_char) -> *mut TfLiteModel;
    fn TfLiteModelDelete(model: *mut TfLiteModel);

    fn TfLiteInterpreterOptionsCreate() -> *mut TfLiteInterpreterOptions;
    fn TfLiteInterpreterOptionsDelete(options: *mut TfLiteInterpreterOptions);
    fn TfLiteInterpreterOptionsSetNumThreads(options: *mut TfLiteInterpreterOptions, num_threads: c_int);
    fn TfLiteInterpreterOptionsAddDelegate(options: *mut TfLiteInterpreterOptions, delegate: *mut TfLiteDelegate);

    fn TfLiteInterpreterCreate(model: *const TfLiteModel, options: *const TfLiteInterpreterOptions) -> *mut TfLiteInterpreter;
    fn TfLiteInterpreterDelete(interpreter: *mut TfLiteInterpreter);

    fn TfLiteInterpreterAllocateTensors(interpreter: *mut TfLiteInterpreter) -> c_int;
    fn TfLiteInterpreterInvoke(interpreter: *mut TfLiteInterpreter) -> c_int;

    fn TfLiteInterpreterGetInputTensor(interpreter: *mut TfLiteInterpreter, index: c_int) -> *mut TfLiteTensor;
    fn TfLiteInterpreterGetOutputTensor(interpreter: *mut TfLiteInterpreter, index: c_int) -> *const TfLiteTensor;

    fn TfLiteTensorData(tensor: *const TfLiteTensor) -> *mut c_void;
    fn TfLiteTensorByteSize(tensor: *const TfLiteTensor) -> usize;

    fn TfLiteTensorNumDims(tensor: *const TfLiteTensor) -> c_int;
    fn TfLiteTensorDim(tensor: *const TfLiteTensor, dim_index: c_int) -> c_int;
}

#[cfg(feature = "vision-coral")]
#[link(name = "edgetpu")]
extern "C" {
    fn edgetpu_create_delegate(device_type: c_int, device_path: *const c_char, options: *const c_char) -> *mut TfLiteDelegate;
    fn edgetpu_free_delegate(delegate: *mut TfLiteDelegate);
}

/// Native interpreter state. Invoking mutates tensors, so it lives behind a Mutex.
struct Interpreter {
    model: *mut TfLiteModel,
    opts: *mut TfLiteInterpreterOptions,
    interp: *mut TfLiteInterpreter,
    #[cfg(feature = "vision-coral")]
    delegate: Option<*mut TfLiteDelegate>,
}

unsafe impl Send for Interpreter {}

pub struct TfliteDetector {
    cfg: VisionConfig,
    rt: Mutex<Interpreter>,
}

impl TfliteDetector {
    pub fn new(cfg: VisionConfig) -> Result<Self> {
        let model_path = if cfg.use_coral { &cfg.model_path_edgetpu } else { &cfg.model_path };
        let cpath = CString::new(model_path.as_str())?;
        let model = unsafe { TfLiteModelCreateFromFile(cpath.as_ptr()) };
        anyhow::ensure!(!model.is_null(), "failed to load tflite model: {}", model_path);

        let opts = unsafe { TfLiteInterpreterOptionsCreate() };
        anyhow::ensure!(!opts.is_null(), "failed to create tflite options");
        unsafe { TfLiteInterpreterOptionsSetNumThreads(opts, 2); }

        #[cfg(feature = "vision-coral")]
        let delegate = if cfg.use_coral {
            let d = unsafe { edgetpu_create_delegate(0, ptr::null(), ptr::null()) };
            anyhow::ensure!(!d.is_null(), "failed to create EdgeTPU delegate");
            unsafe { TfLiteInterpreterOptionsAddDelegate(opts, d); }
            Some(d)
        } else { None };

        #[cfg(not(feature = "vision-coral"))]
        if cfg.use_coral {
            anyhow::bail!("vision.use_coral=true but binary not built with --features vision-coral");
        }

        let interp = unsafe { TfLiteInterpreterCreate(model, opts) };
        anyhow::ensure!(!interp.is_null(), "failed to create tflite interpreter");

        let rc = unsafe { TfLiteInterpreterAllocateTensors(interp) };
        anyhow::ensure!(rc == 0, "TfLiteInterpreterAllocateTensors failed");

        info!("vision: loaded TFLite model: {}", model_path);

        Ok(Self {
            cfg,
            rt: Mutex::new(Interpreter {
                model, opts, interp,
                #[cfg(feature = "vision-coral")]
                delegate,
            }),
        })
    }

    pub fn inspect(&self) -> Result<String> {
        let rt = self.rt.lock().map_err(|_| anyhow!("interpreter lock poisoned"))?;
        let input = unsafe { TfLiteInterpreterGetInputTensor(rt.interp, 0) };
        anyhow::ensure!(!input.is_null(), "no input tensor");
        let in_dims = tensor_dims(input);
        let in_bytes = unsafe { TfLiteTensorByteSize(input) };

        let out0 = unsafe { TfLiteInterpreterGetOutputTensor(rt.interp, 0) };
        anyhow::ensure!(!out0.is_null(), "no output tensor 0");
        let out_dims = tensor_dims(out0);
        let out_bytes = unsafe { TfLiteTensorByteSize(out0) };

        Ok(format!(
            "TFLite inspect:\n- input[0] dims={:?} bytes={}\n- output[0] dims={:?} bytes={}\n- classes={} layout={}\n",
            in_dims, in_bytes, out_dims, out_bytes, self.cfg.class_names.len(), self.cfg.output_layout
        ))
    }

    fn write_input(&self, rt: &Interpreter, img: &RgbImage) -> Result<()> {
        let resized = image::imageops::resize(img, self.cfg.img_w, self.cfg.img_h, FilterType::Triangle);
        let input = unsafe { TfLiteInterpreterGetInputTensor(rt.interp, 0) };
        anyhow::ensure!(!input.is_null(), "no input tensor");

        let in_bytes = unsafe { TfLiteTensorByteSize(input) };
        let in_ptr = unsafe { TfLiteTensorData(input) };
        anyhow::ensure!(!in_ptr.is_null(), "null input tensor data");

        let px = resized.as_raw();
        let need = px.len();
        if in_bytes == need {
            // u8 RGB input (quant/edgetpu)
            unsafe { ptr::copy_nonoverlapping(px.as_ptr(), in_ptr as *mut u8, need); }
        } else if in_bytes == need * std::mem::size_of::<f32>() {
            // float32 RGB input scaled 0..1
            let dst = unsafe { std::slice::from_raw_parts_mut(in_ptr as *mut f32, need) };
            for (d, s) in dst.iter_mut().zip(px) {
                *d = *s as f32 / 255.0;
            }
        } else {
            anyhow::bail!(
                "input tensor is {} bytes; expected {} (u8) or {} (f32) for {}x{} RGB",
                in_bytes, need, need * 4, self.cfg.img_w, self.cfg.img_h
            );
        }
        Ok(())
    }
}

impl Detector for TfliteDetector {
    fn name(&self) -> &str {
        "tflite"
    }

    fn class_names(&self) -> &[String] {
        &self.cfg.class_names
    }

    fn detect(&self, img: &RgbImage) -> Result<Vec<RawDetection>> {
        let rt = self.rt.lock().map_err(|_| anyhow!("interpreter lock poisoned"))?;
        self.write_input(&rt, img)?;

        let rc = unsafe { TfLiteInterpreterInvoke(rt.interp) };
        anyhow::ensure!(rc == 0, "TfLiteInterpreterInvoke failed");

        let out = unsafe { TfLiteInterpreterGetOutputTensor(rt.interp, 0) };
        anyhow::ensure!(!out.is_null(), "no output tensor 0");

        let out_dims = tensor_dims(out);
        let out_ptr = unsafe { TfLiteTensorData(out) as *const f32 };
        anyhow::ensure!(!out_ptr.is_null(), "null output tensor data");
        let out_bytes = unsafe { TfLiteTensorByteSize(out) };
        let out_len = out_bytes / std::mem::size_of::<f32>();
        let raw = unsafe { std::slice::from_raw_parts(out_ptr, out_len) };

        let nc = self.cfg.class_names.len();
        let cands = match (self.cfg.output_layout.as_str(), out_dims.as_slice()) {
            ("ultralytics", [1, n, s]) | ("ultralytics", [n, s]) => {
                anyhow::ensure!(*s as usize == 5 + nc, "stride mismatch: got {}, expected {} (dims {:?})", s, 5 + nc, out_dims);
                postprocess_ultralytics(raw, *n as usize, nc, self.cfg.conf_threshold)
            }
            ("yolov8", [1, c, n]) | ("yolov8", [c, n]) => {
                anyhow::ensure!(*c as usize == 4 + nc, "channel mismatch: got {}, expected {} (dims {:?})", c, 4 + nc, out_dims);
                postprocess_yolov8(raw, *n as usize, nc, self.cfg.conf_threshold)
            }
            (layout, dims) => anyhow::bail!(
                "unsupported output_layout {} for dims {:?}. Run `vigil vision inspect` to view tensors.",
                layout, dims
            ),
        };

        let kept = nms_filter(cands, self.cfg.nms_iou_threshold, self.cfg.max_detections);
        debug!("tflite: {} detections after nms", kept.len());
        Ok(kept.iter().map(|c| c.to_pixels(img.width(), img.height())).collect())
    }
}

fn tensor_dims(t: *const TfLiteTensor) -> Vec<i32> {
    unsafe {
        let nd = TfLiteTensorNumDims(t);
        let mut v = Vec::with_capacity(nd.max(0) as usize);
        for i in 0..nd { v.push(TfLiteTensorDim(t, i)); }
        v
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        unsafe {
            if !self.interp.is_null() { TfLiteInterpreterDelete(self.interp); }
            if !self.opts.is_null() { TfLiteInterpreterOptionsDelete(self.opts); }
            if !self.model.is_null() { TfLiteModelDelete(self.model); }
        }
        #[cfg(feature = "vision-coral")]
        unsafe {
            if let Some(d) = self.delegate {
                edgetpu_free_delegate(d);
            }
        }
    }
}
