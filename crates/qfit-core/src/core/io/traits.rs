use crate::core::models::system::MolecularSystem;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Common interface for reading and writing molecular file formats.
///
/// Implementors handle format-specific parsing and serialization; the path-based helpers are
/// provided on top of the reader/writer methods.
pub trait MolecularFile {
    /// Format-specific data that does not fit the molecular model (header records, etc.).
    type Metadata: Default;

    /// The error type of the format's parser and writer.
    type Error: Error + From<io::Error>;

    /// Reads a molecular system from a buffered reader.
    ///
    /// # Arguments
    ///
    /// * `reader` - The buffered reader to read from.
    ///
    /// # Return
    ///
    /// Returns the parsed system, alternate locations included, and the format metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if a record is malformed or the reader fails.
    fn read_from(
        reader: &mut impl BufRead,
    ) -> Result<(MolecularSystem, Self::Metadata), Self::Error>;

    /// Writes a molecular system and its metadata.
    ///
    /// # Arguments
    ///
    /// * `system` - The molecular system to write.
    /// * `metadata` - Header data to emit before the coordinates.
    /// * `writer` - The destination.
    ///
    /// # Return
    ///
    /// Returns `Ok(())` once every record is written.
    ///
    /// # Errors
    ///
    /// Returns an error if a field does not fit the format or the writer fails.
    fn write_to(
        system: &MolecularSystem,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error>;

    /// Writes a molecular system with default metadata.
    ///
    /// # Arguments
    ///
    /// * `system` - The molecular system to write.
    /// * `writer` - The destination.
    ///
    /// # Errors
    ///
    /// Same as [`MolecularFile::write_to`].
    fn write_system_to(
        system: &MolecularSystem,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        Self::write_to(system, &Self::Metadata::default(), writer)
    }

    /// Reads a molecular system from a file.
    ///
    /// # Arguments
    ///
    /// * `path` - The file to open.
    ///
    /// # Return
    ///
    /// Returns the parsed system and the format metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its content fails to parse.
    fn read_from_path<P: AsRef<Path>>(
        path: P,
    ) -> Result<(MolecularSystem, Self::Metadata), Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    /// Writes a molecular system and its metadata to a file, replacing any existing content.
    ///
    /// # Arguments
    ///
    /// * `system` - The molecular system to write.
    /// * `metadata` - Header data to emit before the coordinates.
    /// * `path` - The file to create.
    ///
    /// # Return
    ///
    /// Returns `Ok(())` once the output is flushed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    fn write_to_path<P: AsRef<Path>>(
        system: &MolecularSystem,
        metadata: &Self::Metadata,
        path: P,
    ) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(system, metadata, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
