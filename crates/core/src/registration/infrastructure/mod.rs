pub mod fs_sample_store;
