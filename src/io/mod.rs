//! IO drivers: where analysis results, template previews and errors go.
//!
//! - `run` writes one JSON object per line to a sink and does not support
//!   previews.
//! - `test` (feature `image-io`) exports images next to the JSON so that a
//!   template author can check the extraction visually.

use crate::analysis::AnalysisResult;
use crate::image::OwnedImage;
use crate::template::Template;
use crate::util::{ErrorKind, OfficialEyeError, OfficialEyeResult};
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;

/// Consumer of pipeline outputs.
pub trait IoDriver {
    /// Identifier the driver is selected by.
    fn id(&self) -> &str;

    /// Handles a finished analysis of `target`.
    fn handle_analysis_result(
        &mut self,
        template: &Template,
        target: &OwnedImage,
        result: &AnalysisResult,
    ) -> OfficialEyeResult<()>;

    /// Handles a rendered template preview.
    fn handle_show_result(&mut self, template: &Template, image: &OwnedImage)
        -> OfficialEyeResult<()>;

    /// Reports an error.
    fn handle_error(&mut self, error: &OfficialEyeError) -> OfficialEyeResult<()>;
}

fn write_line<W: Write>(out: &mut W, driver: &str, value: &Value) -> OfficialEyeResult<()> {
    writeln!(out, "{value}").and_then(|()| out.flush()).map_err(|err| {
        OfficialEyeError::new(
            ErrorKind::IoFailed,
            format!("while writing output of the '{driver}' driver"),
            "the output could not be written",
        )
        .with_cause(err)
    })
}

fn error_json(error: &OfficialEyeError) -> Value {
    json!({ "error": error.to_json() })
}

/// Writes results and errors as JSON lines.
pub struct RunDriver<W: Write> {
    out: W,
}

impl<W: Write> RunDriver<W> {
    pub const ID: &'static str = "run";

    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> IoDriver for RunDriver<W> {
    fn id(&self) -> &str {
        Self::ID
    }

    fn handle_analysis_result(
        &mut self,
        _template: &Template,
        _target: &OwnedImage,
        result: &AnalysisResult,
    ) -> OfficialEyeResult<()> {
        write_line(&mut self.out, Self::ID, &result.to_json())
    }

    fn handle_show_result(
        &mut self,
        template: &Template,
        _image: &OwnedImage,
    ) -> OfficialEyeResult<()> {
        Err(OfficialEyeError::new(
            ErrorKind::OperationNotSupportedByDriver,
            format!("while showing template '{}'", template.identifier()),
            format!("The '{}' driver cannot display images.", Self::ID),
        ))
    }

    fn handle_error(&mut self, error: &OfficialEyeError) -> OfficialEyeResult<()> {
        write_line(&mut self.out, Self::ID, &error_json(error))
    }
}

/// Exports application images and previews into a directory, and writes
/// JSON lines like the `run` driver.
#[cfg(feature = "image-io")]
pub struct TestDriver<W: Write> {
    export_dir: std::path::PathBuf,
    out: W,
}

#[cfg(feature = "image-io")]
impl<W: Write> TestDriver<W> {
    pub const ID: &'static str = "test";

    pub fn new(export_dir: impl Into<std::path::PathBuf>, out: W) -> Self {
        Self {
            export_dir: export_dir.into(),
            out,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn export(&self, image: &OwnedImage, file_name: &str) -> OfficialEyeResult<String> {
        std::fs::create_dir_all(&self.export_dir).map_err(|err| {
            OfficialEyeError::new(
                ErrorKind::IoFailed,
                format!("while preparing export directory '{}'", self.export_dir.display()),
                "the directory could not be created",
            )
            .with_cause(err)
        })?;
        let path = self.export_dir.join(file_name);
        crate::image::io::save_gray_image(image, &path)?;
        Ok(path.display().to_string())
    }
}

#[cfg(feature = "image-io")]
impl<W: Write> IoDriver for TestDriver<W> {
    fn id(&self) -> &str {
        Self::ID
    }

    fn handle_analysis_result(
        &mut self,
        template: &Template,
        target: &OwnedImage,
        result: &AnalysisResult,
    ) -> OfficialEyeResult<()> {
        let application =
            crate::analysis::render_application_image(template, target, result.supervision())?;
        let path = self.export(
            &application.image,
            &format!("{}_application.png", template.identifier()),
        )?;
        let mut value = result.to_json();
        value["application_image"] = json!(path);
        value["warnings"] = json!(application.warnings);
        write_line(&mut self.out, Self::ID, &value)
    }

    fn handle_show_result(
        &mut self,
        template: &Template,
        image: &OwnedImage,
    ) -> OfficialEyeResult<()> {
        let path = self.export(image, &format!("{}_show.png", template.identifier()))?;
        write_line(
            &mut self.out,
            Self::ID,
            &json!({"template": template.identifier(), "show_image": path}),
        )
    }

    fn handle_error(&mut self, error: &OfficialEyeError) -> OfficialEyeResult<()> {
        write_line(&mut self.out, Self::ID, &error_json(error))
    }
}

/// Selects a driver by identifier.
///
/// `export_dir` is only used by the `test` driver and defaults to the
/// current directory.
pub fn driver_by_id<W: Write + 'static>(
    id: &str,
    export_dir: Option<&Path>,
    out: W,
) -> OfficialEyeResult<Box<dyn IoDriver>> {
    match id {
        "run" => Ok(Box::new(RunDriver::new(out))),
        #[cfg(feature = "image-io")]
        "test" => Ok(Box::new(TestDriver::new(
            export_dir.unwrap_or_else(|| Path::new(".")),
            out,
        ))),
        other => {
            let _ = export_dir;
            Err(OfficialEyeError::new(
                ErrorKind::InvalidDriver,
                "while selecting the IO driver",
                format!("No IO driver is available under the identifier '{other}'."),
            ))
        }
    }
}
