use std::fs;
use std::io::Write;

use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;
use zip::write::SimpleFileOptions;

use graph_retrieval::fetch::{FetchRequest, Fetcher, HttpFetcher, extract};

#[test]
fn extracts_zip_archives_once() {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let archive = dir.join("cora.zip");
    {
        let file = fs::File::create(archive.as_std_path()).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file("cora/edges.tsv", options).unwrap();
        writer.write_all(b"a\tb\n").unwrap();
        writer.finish().unwrap();
    }

    extract(&archive, true).unwrap();
    let edges = dir.join("cora/edges.tsv");
    assert_eq!(fs::read_to_string(edges.as_std_path()).unwrap(), "a\tb\n");

    // A cached extraction is not repeated.
    fs::write(edges.as_std_path(), "edited\n").unwrap();
    extract(&archive, true).unwrap();
    assert_eq!(fs::read_to_string(edges.as_std_path()).unwrap(), "edited\n");

    extract(&archive, false).unwrap();
    assert_eq!(fs::read_to_string(edges.as_std_path()).unwrap(), "a\tb\n");
}

#[test]
fn decompresses_gzip_files() {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let gz = dir.join("links.txt.gz");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"p1 p2 900\n").unwrap();
    fs::write(gz.as_std_path(), encoder.finish().unwrap()).unwrap();

    extract(&gz, true).unwrap();

    assert_eq!(
        fs::read_to_string(dir.join("links.txt").as_std_path()).unwrap(),
        "p1 p2 900\n"
    );
}

#[test]
fn cached_files_are_not_downloaded() {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    fs::write(dir.join("edges.tsv").as_std_path(), "a\tb\n").unwrap();
    let urls = vec!["http://127.0.0.1:9/edges.tsv".to_string()];

    HttpFetcher::new()
        .unwrap()
        .fetch(&FetchRequest {
            urls: &urls,
            destination_paths: None,
            target_dir: &dir,
            auto_extract: true,
            use_cache: true,
        })
        .unwrap();
}

#[test]
#[ignore]
fn downloads_over_http() {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let urls = vec!["https://snap.stanford.edu/data/facebook_combined.txt.gz".to_string()];

    HttpFetcher::new()
        .unwrap()
        .fetch(&FetchRequest {
            urls: &urls,
            destination_paths: None,
            target_dir: &dir,
            auto_extract: true,
            use_cache: true,
        })
        .unwrap();

    assert!(dir.join("facebook_combined.txt").as_std_path().exists());
}
