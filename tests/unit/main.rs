mod test_downloader;
mod test_envelope;
mod test_join;
mod test_mask;
mod test_postprocess;
mod test_preprocess;
mod test_text_box;
