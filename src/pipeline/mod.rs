pub mod extraction;
pub mod structuring;
pub mod diagnostic; // Per-request artifact dump (enabled by dump_dir / CERTEXTRACT_DUMP_DIR)
