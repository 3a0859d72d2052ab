use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;
use structopt::StructOpt;

use log::{debug, info, initialize_logger, o, warn};
use petspot::config::get_variable;
use petspot::db::{Db, PgDb};
use petspot::place::PlaceDetails;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "import-places",
    about = "Load a JSON array of places into the database"
)]
struct Opt {
    /// The JSON file to read
    #[structopt(parse(from_os_str))]
    file: PathBuf,

    /// Only validate the file
    #[structopt(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let opt = Opt::from_args();

    let logger = initialize_logger().new(o!("tool" => "import-places"));

    info!(logger, "Reading places..."; "file" => %opt.file.display());
    let places: Vec<PlaceDetails> = serde_json::from_reader(BufReader::new(File::open(&opt.file)?))?;

    let mut valid = vec![];

    for (index, details) in places.into_iter().enumerate() {
        match details.validate() {
            Ok(details) => valid.push(details),
            Err(e) => warn!(logger, "Skipping invalid place"; "index" => index, "error" => %e),
        }
    }

    info!(logger, "Validated places"; "valid" => valid.len());

    if opt.dry_run {
        return Ok(());
    }

    let connection_string = get_variable("BACKEND_DB_CONNECTION_STRING");
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&connection_string)
        .await?;
    let db = PgDb::new(pool);

    for details in valid {
        let name = details.name.clone();
        let place = db.insert_place(details).await?;

        debug!(logger, "Imported place"; "id" => place.id, "name" => name);
    }

    info!(logger, "Import complete.");

    Ok(())
}
