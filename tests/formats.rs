use std::fs::File;
use std::sync::Arc;

use arrow::array::{Array, BinaryArray, Int64Array, StringArray};
use arrow::datatypes::{DataType as ArrowType, Field, Schema};
use arrow::record_batch::RecordBatch;
use item_writer::config::{CsvConfig, InsertValuesConfig};
use item_writer::{
    new_column, with_writer, BufferedDataWriter, DataType, FileFormat, Record, TableSchema,
    WriterConfig,
};
use parquet::file::reader::{FileReader, SerializedFileReader};
use serde_json::json;

fn people() -> TableSchema {
    TableSchema::from_columns([
        new_column("id", DataType::Bigint).not_null(),
        new_column("name", DataType::Text),
        new_column("active", DataType::Bool),
    ])
}

fn write_people(format: FileFormat, config: WriterConfig, dir: &tempfile::TempDir) -> String {
    let path = dir.path().join(format!("people.{}", format.extension()));
    let columns = people();
    with_writer(config, format, &path, &columns, |w| {
        w.write_data_item(
            vec![
                Record::new().with("id", 1).with("name", "O'Brien").with("active", true),
                Record::new().with("id", 2).with("active", false),
            ],
            &columns,
        )
    })
    .unwrap();
    std::fs::read_to_string(path).unwrap()
}

#[test]
fn jsonl_writes_one_object_per_line() {
    let dir = tempfile::tempdir().unwrap();
    let text = write_people(FileFormat::Jsonl, WriterConfig::default(), &dir);
    let rows: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(
        rows,
        [
            json!({"id": 1, "name": "O'Brien", "active": true}),
            json!({"id": 2, "active": false}),
        ]
    );
    assert!(text.ends_with('\n'));
}

#[test]
fn csv_writes_header_and_column_order() {
    let dir = tempfile::tempdir().unwrap();
    let text = write_people(FileFormat::Csv, WriterConfig::default(), &dir);
    assert_eq!(text, "id,name,active\n1,O'Brien,true\n2,,false\n");
}

#[test]
fn csv_delimiter_and_header_are_configurable() {
    let dir = tempfile::tempdir().unwrap();
    let config = WriterConfig {
        csv: CsvConfig {
            delimiter: '\t',
            include_header: false,
        },
        ..WriterConfig::default()
    };
    let text = write_people(FileFormat::Csv, config, &dir);
    assert_eq!(text, "1\tO'Brien\ttrue\n2\t\tfalse\n");
}

#[test]
fn insert_values_writes_one_statement_per_flush() {
    let dir = tempfile::tempdir().unwrap();
    let text = write_people(FileFormat::InsertValues, WriterConfig::default(), &dir);
    assert_eq!(
        text,
        "INSERT INTO \"people\"(\"id\",\"name\",\"active\")\nVALUES\n(1,'O''Brien',TRUE),\n(2,NULL,FALSE);\n"
    );
}

#[test]
fn insert_values_table_name_is_configurable() {
    let dir = tempfile::tempdir().unwrap();
    let config = WriterConfig {
        insert_values: InsertValuesConfig {
            table_name: Some("staging.people".to_string()),
        },
        ..WriterConfig::default()
    };
    let text = write_people(FileFormat::InsertValues, config, &dir);
    assert!(text.starts_with("INSERT INTO \"staging.people\"(\"id\",\"name\",\"active\")\n"));
}

#[test]
fn insert_values_picks_up_new_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.insert_values");
    let mut writer =
        BufferedDataWriter::new(FileFormat::InsertValues, &path, WriterConfig::default()).unwrap();
    let narrow = TableSchema::new().with_column(new_column("a", DataType::Bigint));
    writer.write_data_item(Record::new().with("a", 1), &narrow).unwrap();
    writer.flush().unwrap();

    let wide = TableSchema::new().with_column(new_column("b", DataType::Text));
    writer.write_data_item(Record::new().with("b", "x"), &wide).unwrap();
    writer.close().unwrap();

    let text = std::fs::read_to_string(path).unwrap();
    assert_eq!(
        text,
        "INSERT INTO \"t\"(\"a\")\nVALUES\n(1);\nINSERT INTO \"t\"(\"a\",\"b\")\nVALUES\n(NULL,'x');\n"
    );
}

#[test]
fn typed_values_render_per_format() {
    let columns = TableSchema::from_columns([
        new_column("ts", DataType::Timestamp),
        new_column("day", DataType::Date),
        new_column("payload", DataType::Complex),
        new_column("score", DataType::Double),
    ]);
    let row = Record::new()
        .with("ts", 0)
        .with("day", "2024-02-29")
        .with("payload", json!({"k": [1, 2]}))
        .with("score", 1.5);

    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("typed.csv");
    let sql_path = dir.path().join("typed.insert_values");
    for (format, path) in [(FileFormat::Csv, &csv_path), (FileFormat::InsertValues, &sql_path)] {
        with_writer(WriterConfig::default(), format, path, &columns, |w| {
            w.write_data_item(row.clone(), &columns)
        })
        .unwrap();
    }

    let csv = std::fs::read_to_string(csv_path).unwrap();
    assert_eq!(
        csv,
        "ts,day,payload,score\n1970-01-01T00:00:00Z,2024-02-29,\"{\"\"k\"\":[1,2]}\",1.5\n"
    );
    let sql = std::fs::read_to_string(sql_path).unwrap();
    assert!(sql.contains("('1970-01-01T00:00:00Z','2024-02-29','{\"k\":[1,2]}',1.5);"));
}

#[test]
fn parquet_takes_records_and_batches() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blob.parquet");
    let columns = TableSchema::from_columns([
        new_column("id", DataType::Bigint).not_null(),
        new_column("name", DataType::Text),
        new_column("data", DataType::Binary),
    ]);

    // batch fields out of column order and without `name`
    let schema = Arc::new(Schema::new(vec![
        Field::new("data", ArrowType::Binary, true),
        Field::new("id", ArrowType::Int64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(BinaryArray::from(vec![Some(b"\x01\x02".as_ref()), None])),
            Arc::new(Int64Array::from(vec![2, 3])),
        ],
    )
    .unwrap();

    let (_, metrics) = with_writer(
        WriterConfig::default(),
        FileFormat::Parquet,
        &path,
        &columns,
        |w| {
            w.write_data_item(
                Record::new().with("id", 1).with("name", "a").with("data", "ff00"),
                &columns,
            )?;
            w.write_data_item(batch, &columns)
        },
    )
    .unwrap();
    assert_eq!(metrics.unwrap().items_count, 3);

    let reader = Arc::new(SerializedFileReader::new(File::open(&path).unwrap()).unwrap());
    assert_eq!(reader.metadata().file_metadata().num_rows(), 3);

    let mut arrow_reader = parquet::arrow::ParquetFileArrowReader::new(reader);
    let batches: Vec<RecordBatch> =
        parquet::arrow::ArrowReader::get_record_reader(&mut arrow_reader, 1024)
            .unwrap()
            .map(Result::unwrap)
            .collect();
    let out = &batches[0];
    assert_eq!(out.schema().field(0).name(), "id");
    let names = out
        .column(1)
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(names.value(0), "a");
    assert!(names.is_null(1));
    let data = out
        .column(2)
        .as_any()
        .downcast_ref::<BinaryArray>()
        .unwrap();
    assert_eq!(data.value(0), b"\xff\x00");
    assert_eq!(data.value(1), b"\x01\x02");
    assert!(data.is_null(2));
}

#[test]
fn parquet_row_groups_follow_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("groups.parquet");
    let columns = TableSchema::new().with_column(new_column("n", DataType::Bigint));
    let mut config = WriterConfig::default();
    config.parquet.row_group_size = 4;

    with_writer(config, FileFormat::Parquet, &path, &columns, |w| {
        let records: Vec<Record> = (0..10).map(|n| Record::new().with("n", n)).collect();
        w.write_data_item(records, &columns)
    })
    .unwrap();

    let reader = SerializedFileReader::new(File::open(&path).unwrap()).unwrap();
    assert_eq!(reader.metadata().file_metadata().num_rows(), 10);
    assert_eq!(reader.metadata().num_row_groups(), 3);
}

#[test]
fn empty_files_on_request() {
    let dir = tempfile::tempdir().unwrap();
    let config = WriterConfig {
        write_empty_file: true,
        ..WriterConfig::default()
    };

    let csv_path = dir.path().join("empty.csv");
    let (_, metrics) =
        with_writer(config.clone(), FileFormat::Csv, &csv_path, &people(), |_| Ok(())).unwrap();
    assert_eq!(metrics.unwrap().items_count, 0);
    assert_eq!(std::fs::read_to_string(&csv_path).unwrap(), "id,name,active\n");

    let parquet_path = dir.path().join("empty.parquet");
    with_writer(config.clone(), FileFormat::Parquet, &parquet_path, &people(), |_| Ok(())).unwrap();
    let reader = SerializedFileReader::new(File::open(&parquet_path).unwrap()).unwrap();
    assert_eq!(reader.metadata().file_metadata().num_rows(), 0);
    assert_eq!(reader.metadata().file_metadata().schema_descr().num_columns(), 3);

    let jsonl_path = dir.path().join("empty.jsonl");
    with_writer(config, FileFormat::Jsonl, &jsonl_path, &people(), |_| Ok(())).unwrap();
    assert_eq!(std::fs::read_to_string(&jsonl_path).unwrap(), "");
}
