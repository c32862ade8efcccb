/*!
# Delimited-text input and output

Reads spectra of `wavelength, intensity[, uncertainty]` rows and writes sampled
chains and autocorrelation functions as CSV.
*/

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim, Writer};
use ndarray::ArrayView2;

use crate::core::Chain;
use crate::error::McmcError;
use crate::model::{Observation, Observations, Params};

/**
Loads observations from a comma-separated file.

See [`load_observations_with_delimiter`] for the accepted format.

# Examples

```rust
use blackbody_mcmc::io::csv::load_observations;
use std::io::Write;

let mut file = tempfile::NamedTempFile::new()?;
writeln!(file, "wavelength,intensity")?;
writeln!(file, "500,12.1")?;
writeln!(file, "600,11.4")?;

let obs = load_observations(file.path())?;
assert_eq!(obs.len(), 2);
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/
pub fn load_observations<P: AsRef<Path>>(path: P) -> Result<Observations, McmcError> {
    load_observations_with_delimiter(path, b',')
}

/**
Loads observations from a delimited text file.

Each data row holds two or three numbers: wavelength in nm, measured intensity
and an optional per-point uncertainty. Lines starting with `#` are comments,
whitespace around fields is ignored and a first row in which no field parses
as a number is treated as a header. Errors name the 1-based line they occurred on.
*/
pub fn load_observations_with_delimiter<P: AsRef<Path>>(
    path: P,
    delimiter: u8,
) -> Result<Observations, McmcError> {
    read_observations(File::open(path)?, delimiter)
}

/// Parses observations from any reader; the format is that of
/// [`load_observations_with_delimiter`].
pub fn read_observations<R: Read>(reader: R, delimiter: u8) -> Result<Observations, McmcError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut points = Vec::new();
    let mut seen_first = false;
    for record in rdr.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = record.position().map_or(0, |p| p.line());
        match parse_row(&record) {
            Ok(point) => points.push(point),
            // A first row with no numeric field is a header.
            Err(_) if !seen_first && record.iter().all(|f| f.parse::<f64>().is_err()) => {}
            Err(msg) => {
                return Err(McmcError::InvalidData(format!("line {line}: {msg}")));
            }
        }
        seen_first = true;
    }

    Observations::new(points)
}

fn parse_row(record: &StringRecord) -> Result<Observation, String> {
    if !(2..=3).contains(&record.len()) {
        return Err(format!("expected 2 or 3 columns, found {}", record.len()));
    }
    let field = |i: usize| -> Result<f64, String> {
        let raw = &record[i];
        raw.parse::<f64>()
            .map_err(|_| format!("column {} is not a number: {raw:?}", i + 1))
    };
    let wavelength = field(0)?;
    let intensity = field(1)?;
    let uncertainty = if record.len() == 3 && !record[2].is_empty() {
        Some(field(2)?)
    } else {
        None
    };

    if !(wavelength.is_finite() && wavelength > 0.0) {
        return Err(format!(
            "wavelength must be positive and finite, got {wavelength}"
        ));
    }
    if !intensity.is_finite() {
        return Err(format!("intensity must be finite, got {intensity}"));
    }
    if let Some(sigma) = uncertainty {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(format!(
                "uncertainty must be positive and finite, got {sigma}"
            ));
        }
    }
    Ok(Observation {
        wavelength,
        intensity,
        uncertainty,
    })
}

/// Column names for `n` parameters: the model's names when the width matches,
/// `dim_0, dim_1, ...` otherwise.
fn param_columns(n: usize) -> Vec<String> {
    if n == Params::DIM {
        Params::NAMES.iter().map(|s| s.to_string()).collect()
    } else {
        (0..n).map(|i| format!("dim_{i}")).collect()
    }
}

/**
Saves sampled chains as a CSV file with columns `backend,chain,sample,<params>`.

`runs` pairs a backend label with the chains that backend produced; chain
indices restart at 0 for each backend. All chains must have the same number of
parameters; otherwise the [`McmcError::ShapeMismatch`] index counts chains
across all backends in output order.

# Examples

```rust
use blackbody_mcmc::core::Chain;
use blackbody_mcmc::io::csv::save_chains_csv;
use ndarray::array;

let chain = Chain::new(array![[5000.0, 1.0], [5010.0, 0.99]], 0.5);
let file = tempfile::NamedTempFile::new()?;
save_chains_csv(&[("metropolis", std::slice::from_ref(&chain))], file.path())?;

let contents = std::fs::read_to_string(file.path())?;
assert!(contents.starts_with("backend,chain,sample,T,A"));
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/
pub fn save_chains_csv<P: AsRef<Path>>(
    runs: &[(&str, &[Chain])],
    path: P,
) -> Result<(), McmcError> {
    write_chains(runs, File::create(path)?)
}

fn write_chains<W: Write>(runs: &[(&str, &[Chain])], out: W) -> Result<(), McmcError> {
    let n_params = runs
        .iter()
        .flat_map(|(_, chains)| chains.iter())
        .map(Chain::n_params)
        .next()
        .unwrap_or(Params::DIM);

    let mut wtr = Writer::from_writer(out);
    let mut header = vec![
        "backend".to_string(),
        "chain".to_string(),
        "sample".to_string(),
    ];
    header.extend(param_columns(n_params));
    wtr.write_record(&header)?;

    let mut global_idx = 0;
    for (backend, chains) in runs {
        for (chain_idx, chain) in chains.iter().enumerate() {
            // Only the width must agree; chains may differ in length.
            if chain.n_params() != n_params {
                return Err(McmcError::ShapeMismatch {
                    index: global_idx,
                    expected: (chain.n_samples(), n_params),
                    found: (chain.n_samples(), chain.n_params()),
                });
            }
            global_idx += 1;
            for (sample_idx, sample) in chain.samples().rows().into_iter().enumerate() {
                let mut row = vec![
                    backend.to_string(),
                    chain_idx.to_string(),
                    sample_idx.to_string(),
                ];
                row.extend(sample.iter().map(|v| v.to_string()));
                wtr.write_record(&row)?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}

/// Saves autocorrelation functions, `n_lags x n_params`, with columns
/// `lag,<params>`.
pub fn save_autocorrelation_csv<P: AsRef<Path>>(
    acf: ArrayView2<f64>,
    path: P,
) -> Result<(), McmcError> {
    let mut wtr = Writer::from_writer(File::create(path)?);

    let mut header = vec!["lag".to_string()];
    header.extend(param_columns(acf.ncols()));
    wtr.write_record(&header)?;

    for (lag, values) in acf.rows().into_iter().enumerate() {
        let mut row = vec![lag.to_string()];
        row.extend(values.iter().map(|v| v.to_string()));
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use csv::Reader;
    use ndarray::array;
    use std::fs;
    use tempfile::NamedTempFile;

    fn parse(text: &str) -> Result<Observations, McmcError> {
        read_observations(text.as_bytes(), b',')
    }

    #[test]
    fn test_load_with_header_and_comments() {
        let obs = parse(
            "# spectrum of a 5000 K source\n\
             wavelength, intensity, uncertainty\n\
             400, 10.5, 0.2\n\
             \n\
             # mid-range\n\
             500 , 12.1 , 0.2\n\
             600,11.4,\n",
        )
        .unwrap();
        assert_eq!(obs.len(), 3);
        assert_eq!(obs.wavelengths(), vec![400.0, 500.0, 600.0]);
        assert_eq!(obs.as_slice()[1].uncertainty, Some(0.2));
        assert_eq!(obs.as_slice()[2].uncertainty, None);
    }

    #[test]
    fn test_load_without_header() {
        let obs = parse("400,10.5\n500,12.1\n").unwrap();
        assert_eq!(obs.intensities(), vec![10.5, 12.1]);
        assert!(obs.iter().all(|o| o.uncertainty.is_none()));
    }

    #[test]
    fn test_load_other_delimiter() {
        let file = NamedTempFile::new().expect("Could not create temp file");
        fs::write(file.path(), "wl\tI\n700\t9.0\n800\t7.5\n").unwrap();
        let obs = load_observations_with_delimiter(file.path(), b'\t').unwrap();
        assert_eq!(obs.len(), 2);
    }

    #[test]
    fn test_load_reports_line_numbers() {
        let err = parse("wavelength,intensity\n400,10.5\n500,abc\n").unwrap_err();
        match err {
            McmcError::InvalidData(msg) => {
                assert!(msg.starts_with("line 3"), "{msg}");
                assert!(msg.contains("abc"), "{msg}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_malformed_first_row_is_not_a_header() {
        let err = parse("400,abc\n500,12.1\n").unwrap_err();
        match err {
            McmcError::InvalidData(msg) => {
                assert!(msg.starts_with("line 1"), "{msg}");
                assert!(msg.contains("abc"), "{msg}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        // A header row is skipped only when none of its fields is numeric.
        assert_eq!(parse("wl,I\n400,10.5\n").unwrap().len(), 1);
        assert!(matches!(
            parse("wl,10.5\n500,12.1\n"),
            Err(McmcError::InvalidData(_))
        ));
    }

    #[test]
    fn test_load_rejects_bad_rows() {
        assert!(matches!(
            parse("400,10.5,0.2,7\n"),
            Err(McmcError::InvalidData(_))
        ));
        assert!(matches!(
            parse("-400,10.5\n"),
            Err(McmcError::InvalidData(_))
        ));
        assert!(matches!(
            parse("400,10.5,0\n"),
            Err(McmcError::InvalidData(_))
        ));
        // Header only.
        assert!(matches!(
            parse("wavelength,intensity\n"),
            Err(McmcError::InvalidData(_))
        ));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_observations(dir.path().join("missing.csv")),
            Err(McmcError::Io(_))
        ));
    }

    #[test]
    fn test_save_chains_multi_backend() {
        let mh = Chain::new(array![[1.0, 2.0], [3.0, 4.0]], 0.5);
        let ens = Chain::new(array![[10.0, 20.0]], 0.7);
        let file = NamedTempFile::new().expect("Could not create temp file");

        save_chains_csv(
            &[
                ("metropolis", std::slice::from_ref(&mh)),
                ("ensemble", &[ens.clone(), ens][..]),
            ],
            file.path(),
        )
        .unwrap();

        let contents = fs::read_to_string(file.path()).unwrap();
        let expected = "\
backend,chain,sample,T,A
metropolis,0,0,1,2
metropolis,0,1,3,4
ensemble,0,0,10,20
ensemble,1,0,10,20";
        assert_eq!(contents.trim(), expected);
    }

    #[test]
    fn test_save_chains_generic_columns() {
        let chain = Chain::new(array![[1.0, 2.0, 3.0]], 1.0);
        let file = NamedTempFile::new().expect("Could not create temp file");
        save_chains_csv(&[("mh", std::slice::from_ref(&chain))], file.path()).unwrap();

        let mut rdr = Reader::from_path(file.path()).unwrap();
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["backend", "chain", "sample", "dim_0", "dim_1", "dim_2"]
        );
        assert_eq!(rdr.records().count(), 1);
    }

    #[test]
    fn test_save_chains_rejects_mixed_widths() {
        let a = Chain::new(array![[1.0, 2.0]], 1.0);
        let b = Chain::new(array![[1.0, 2.0, 3.0]], 1.0);
        let file = NamedTempFile::new().expect("Could not create temp file");
        assert!(matches!(
            save_chains_csv(&[("mh", &[a, b][..])], file.path()),
            Err(McmcError::ShapeMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn test_save_chains_mismatch_index_spans_backends() {
        let a = Chain::new(array![[1.0, 2.0]], 1.0);
        let b = Chain::new(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]], 1.0);
        let file = NamedTempFile::new().expect("Could not create temp file");
        let rhat_chains = [a.clone(), a.clone(), b];
        let runs = [
            ("metropolis", std::slice::from_ref(&a)),
            ("gelman-rubin", &rhat_chains[..]),
        ];
        match save_chains_csv(&runs, file.path()) {
            Err(McmcError::ShapeMismatch {
                index,
                expected,
                found,
            }) => {
                assert_eq!(index, 3);
                assert_eq!(expected, (2, 2));
                assert_eq!(found, (2, 3));
            }
            other => panic!("expected shape mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_save_autocorrelation() {
        let acf = array![[1.0, 1.0], [0.5, 0.25], [0.25, 0.0625]];
        let file = NamedTempFile::new().expect("Could not create temp file");
        save_autocorrelation_csv(acf.view(), file.path()).unwrap();

        let contents = fs::read_to_string(file.path()).unwrap();
        let expected = "\
lag,T,A
0,1,1
1,0.5,0.25
2,0.25,0.0625";
        assert_eq!(contents.trim(), expected);
    }
}
