//! Turns DICOM files into [`Slice`]s for the reconstructor, plus the
//! series-level metadata the overlay shows.

use crate::reconstructor::Slice;

use dicom::{
    core::Tag,
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use log::{debug, warn};
use nalgebra::Vector3;
use ndarray::{Array2, s};
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Descriptive tags of a series, shown in the overlay corners.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SeriesInfo {
    pub patient_name: Option<String>,
    pub patient_id: Option<String>,
    pub patient_sex: Option<String>,
    pub patient_age: Option<String>,
    pub institution: Option<String>,
    pub manufacturer: Option<String>,
    pub study_date: Option<String>,
    pub study_time: Option<String>,
    pub series_description: Option<String>,
    pub slice_thickness: Option<f32>,
    pub window_center: Option<f32>,
    pub window_width: Option<f32>,
}

impl SeriesInfo {
    /// `YYYYMMDD` rendered as `YYYY/MM/DD`; other shapes pass through.
    pub fn formatted_date(&self) -> Option<String> {
        let date = self.study_date.as_deref()?;
        if date.len() == 8 && date.is_ascii() {
            Some(format!("{}/{}/{}", &date[..4], &date[4..6], &date[6..]))
        } else {
            Some(date.to_string())
        }
    }

    /// `HHMMSS...` rendered as `HH:MM`.
    pub fn formatted_time(&self) -> Option<String> {
        let time = self.study_time.as_deref()?;
        if time.len() >= 4 && time.is_ascii() {
            Some(format!("{}:{}", &time[..2], &time[2..4]))
        } else {
            Some(time.to_string())
        }
    }
}

/// A loaded series: slices in file order plus metadata from the first file.
pub struct LoadedSeries {
    pub slices: Vec<Slice>,
    pub info: SeriesInfo,
}

pub struct DicomSource;

impl DicomSource {
    /// Convert DICOM objects into slices. Objects whose pixel data cannot be
    /// decoded become undecodable slices and are dropped by the
    /// reconstructor.
    ///
    /// # Errors
    ///
    /// Returns error if `dicom_objects` is empty
    pub fn from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
    ) -> Result<LoadedSeries, SourceError> {
        let first = dicom_objects.first().ok_or(SourceError::NoValidImages)?;
        let slices = dicom_objects.iter().map(Self::extract_slice).collect();
        Ok(LoadedSeries {
            slices,
            info: Self::series_info(first),
        })
    }

    /// Load a series from file paths. Unreadable files are skipped.
    pub fn load_from_file_paths(paths: &[impl AsRef<Path>]) -> Result<LoadedSeries, SourceError> {
        let objects: Vec<_> = paths
            .iter()
            .filter_map(|path| match open_file(path.as_ref()) {
                Ok(object) => Some(object),
                Err(err) => {
                    warn!("skipping {}: {err}", path.as_ref().display());
                    None
                }
            })
            .collect();

        Self::from_dicom_objects(&objects)
    }

    /// Load a series from a directory containing .dcm files
    pub fn load_from_directory(path: impl AsRef<Path>) -> Result<LoadedSeries, SourceError> {
        let mut paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(SourceError::NoValidImages);
        }
        paths.sort();
        debug!("found {} DICOM files in {}", paths.len(), path.as_ref().display());

        Self::load_from_file_paths(&paths)
    }

    fn extract_slice(dicom_object: &FileDicomObject<InMemDicomObject>) -> Slice {
        let mut slice = match Self::decode_image(dicom_object) {
            Some(pixels) => Slice::new(pixels),
            None => Slice::undecodable(),
        };

        if let Some(position) = Self::floats(dicom_object, tags::IMAGE_POSITION_PATIENT)
            .filter(|values| values.len() >= 3)
        {
            slice = slice.with_position(Vector3::new(position[0], position[1], position[2]));
        }
        if let Some(cosines) = Self::floats(dicom_object, tags::IMAGE_ORIENTATION_PATIENT)
            .filter(|values| values.len() >= 6)
        {
            let row = Vector3::new(cosines[0], cosines[1], cosines[2]);
            let column = Vector3::new(cosines[3], cosines[4], cosines[5]);
            slice = slice.with_direction_cosines(row, column);
        }
        if let Some(spacing) =
            Self::floats(dicom_object, tags::PIXEL_SPACING).filter(|values| values.len() >= 2)
        {
            slice = slice.with_pixel_spacing(spacing[0], spacing[1]);
        }
        if let Some(thickness) = Self::float(dicom_object, tags::SLICE_THICKNESS) {
            slice = slice.with_slice_thickness(thickness);
        }
        if let Some(number) = dicom_object
            .element(tags::INSTANCE_NUMBER)
            .ok()
            .and_then(|element| element.to_int::<i32>().ok())
        {
            slice = slice.with_instance_number(number);
        }
        slice
    }

    /// Pixel data with the modality LUT applied (Hounsfield units for CT).
    fn decode_image(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<f32>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::Identity);
        pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
    }

    fn series_info(dicom_object: &FileDicomObject<InMemDicomObject>) -> SeriesInfo {
        SeriesInfo {
            patient_name: Self::text(dicom_object, tags::PATIENT_NAME),
            patient_id: Self::text(dicom_object, tags::PATIENT_ID),
            patient_sex: Self::text(dicom_object, tags::PATIENT_SEX),
            patient_age: Self::text(dicom_object, tags::PATIENT_AGE),
            institution: Self::text(dicom_object, tags::INSTITUTION_NAME),
            manufacturer: Self::text(dicom_object, tags::MANUFACTURER),
            study_date: Self::text(dicom_object, tags::STUDY_DATE),
            study_time: Self::text(dicom_object, tags::STUDY_TIME),
            series_description: Self::text(dicom_object, tags::SERIES_DESCRIPTION),
            slice_thickness: Self::float(dicom_object, tags::SLICE_THICKNESS).map(|v| v as f32),
            window_center: Self::first_float(dicom_object, tags::WINDOW_CENTER),
            window_width: Self::first_float(dicom_object, tags::WINDOW_WIDTH),
        }
    }

    fn text(dicom_object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<String> {
        let element = dicom_object.element(tag).ok()?;
        let text = element.to_str().ok()?;
        let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        (!text.is_empty()).then(|| text.to_string())
    }

    fn floats(dicom_object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<Vec<f64>> {
        dicom_object.element(tag).ok()?.to_multi_float64().ok()
    }

    fn float(dicom_object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<f64> {
        dicom_object.element(tag).ok()?.to_float64().ok()
    }

    /// First value of a possibly multi-valued numeric tag.
    fn first_float(dicom_object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<f32> {
        Self::floats(dicom_object, tag)?.first().map(|v| *v as f32)
    }
}
