//! Format extractors registered at startup. Each one implements
//! [`crate::extract::Extractor`] and turns a downloaded artifact into the
//! unified result shape.

pub mod audio;
pub mod code;
pub mod csv;
pub mod html;
pub mod image;
pub mod json;
pub mod latex;
pub mod notebook;
pub mod office;
pub mod pdf;
pub mod plaintext;
pub mod video;
pub mod xml;
pub mod yaml;

pub use audio::AudioExtractor;
pub use code::SourceExtractor;
pub use csv::CsvExtractor;
pub use html::HtmlExtractor;
pub use image::ImageExtractor;
pub use json::JsonExtractor;
pub use latex::LatexExtractor;
pub use notebook::NotebookExtractor;
pub use office::OfficeExtractor;
pub use pdf::PdfExtractor;
pub use plaintext::PlainTextExtractor;
pub use video::VideoExtractor;
pub use xml::XmlExtractor;
pub use yaml::YamlExtractor;
