use flate2::bufread::GzDecoder;
use std::io::BufReader;
use std::path::Path;

/// Name for the decompressed output: the artifact name with its `.gz`
/// suffix removed.  Returns `None` when there is no such suffix or nothing
/// would be left of the name.
pub(crate) fn extracted_name(filename: &str) -> Option<&str> {
    filename
        .strip_suffix(".gz")
        .filter(|stem| !stem.is_empty())
}

/// Decompress the gzipped file at `src` into `dest`, streaming.  Returns
/// the number of decompressed bytes written.
pub(crate) fn gunzip_file(src: &Path, dest: &Path) -> std::io::Result<u64> {
    let infile = fs_err::File::open(src)?;
    let mut decoder = GzDecoder::new(BufReader::new(infile));
    let mut outfile = fs_err::File::create(dest)?;
    std::io::copy(&mut decoder, &mut outfile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use rstest::rstest;
    use std::io::Write;

    #[rstest]
    #[case("greenrevenue_2024-01-01T00_00_00.csv.gz", Some("greenrevenue_2024-01-01T00_00_00.csv"))]
    #[case("archive.tar.gz", Some("archive.tar"))]
    #[case("report.csv", None)]
    #[case(".gz", None)]
    #[case("", None)]
    fn test_extracted_name(#[case] filename: &str, #[case] name: Option<&str>) {
        assert_eq!(extracted_name(filename), name);
    }

    #[test]
    fn gunzip_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("report.csv.gz");
        let dest = tmp.path().join("report.csv");
        let payload = b"col-a,col-b\n1,2\n3,4\n";
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        fs_err::write(&src, encoder.finish().unwrap()).unwrap();
        let n = gunzip_file(&src, &dest).unwrap();
        assert_eq!(n, payload.len() as u64);
        assert_eq!(fs_err::read(&dest).unwrap(), payload);
    }

    #[test]
    fn gunzip_rejects_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("garbage.gz");
        let dest = tmp.path().join("garbage");
        fs_err::write(&src, b"not gzip at all").unwrap();
        assert!(gunzip_file(&src, &dest).is_err(), "garbage input accepted");
    }
}
