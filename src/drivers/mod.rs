pub mod hda;
