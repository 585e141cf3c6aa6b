//! Reference SQL for the Sparkify star schema.
//!
//! The selects are fragments: loaders prepend `INSERT INTO <table>`.

/// Creates the two staging tables, the fact table and the four dimensions.
pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS staging_events (
    artist          VARCHAR,
    auth            VARCHAR,
    firstName       VARCHAR,
    gender          VARCHAR,
    itemInSession   INTEGER,
    lastName        VARCHAR,
    length          FLOAT,
    level           VARCHAR,
    location        VARCHAR,
    method          VARCHAR,
    page            VARCHAR,
    registration    BIGINT,
    sessionId       INTEGER,
    song            VARCHAR,
    status          INTEGER,
    ts              BIGINT,
    userAgent       VARCHAR,
    userId          INTEGER
);

CREATE TABLE IF NOT EXISTS staging_songs (
    num_songs         INTEGER,
    artist_id         VARCHAR,
    artist_name       VARCHAR,
    artist_latitude   FLOAT,
    artist_longitude  FLOAT,
    artist_location   VARCHAR,
    song_id           VARCHAR,
    title             VARCHAR,
    duration          FLOAT,
    year              INTEGER
);

CREATE TABLE IF NOT EXISTS songplays (
    songplay_id  VARCHAR(32) NOT NULL,
    start_time   TIMESTAMP NOT NULL,
    user_id      INTEGER NOT NULL,
    level        VARCHAR,
    song_id      VARCHAR,
    artist_id    VARCHAR,
    session_id   INTEGER,
    location     VARCHAR,
    user_agent   VARCHAR,
    PRIMARY KEY (songplay_id)
);

CREATE TABLE IF NOT EXISTS users (
    user_id     INTEGER NOT NULL,
    first_name  VARCHAR,
    last_name   VARCHAR,
    gender      VARCHAR,
    level       VARCHAR,
    PRIMARY KEY (user_id)
);

CREATE TABLE IF NOT EXISTS songs (
    song_id    VARCHAR NOT NULL,
    title      VARCHAR,
    artist_id  VARCHAR,
    year       INTEGER,
    duration   FLOAT,
    PRIMARY KEY (song_id)
);

CREATE TABLE IF NOT EXISTS artists (
    artist_id  VARCHAR NOT NULL,
    name       VARCHAR,
    location   VARCHAR,
    latitude   FLOAT,
    longitude  FLOAT,
    PRIMARY KEY (artist_id)
);

CREATE TABLE IF NOT EXISTS time (
    start_time  TIMESTAMP NOT NULL,
    hour        INTEGER,
    day         INTEGER,
    week        INTEGER,
    month       INTEGER,
    year        INTEGER,
    weekday     INTEGER,
    PRIMARY KEY (start_time)
);
"#;

/// Joins song-play events to song metadata.
pub const SONGPLAY_TABLE_INSERT: &str = r#"
SELECT
    md5(events.sessionid || events.start_time) AS songplay_id,
    events.start_time,
    events.userid,
    events.level,
    songs.song_id,
    songs.artist_id,
    events.sessionid,
    events.location,
    events.useragent
FROM (
    SELECT TIMESTAMP 'epoch' + ts / 1000 * INTERVAL '1 second' AS start_time, *
    FROM staging_events
    WHERE page = 'NextSong'
) events
LEFT JOIN staging_songs songs
    ON events.song = songs.title
    AND events.artist = songs.artist_name
    AND events.length = songs.duration
"#;

/// Distinct users seen in song-play events.
pub const USER_TABLE_INSERT: &str = r#"
SELECT DISTINCT userid, firstname, lastname, gender, level
FROM staging_events
WHERE page = 'NextSong' AND userid IS NOT NULL
"#;

/// Distinct songs from the song metadata.
pub const SONG_TABLE_INSERT: &str = r#"
SELECT DISTINCT song_id, title, artist_id, year, duration
FROM staging_songs
"#;

/// Distinct artists from the song metadata.
pub const ARTIST_TABLE_INSERT: &str = r#"
SELECT DISTINCT artist_id, artist_name, artist_location, artist_latitude, artist_longitude
FROM staging_songs
"#;

/// Timestamp breakdown of every song play.
pub const TIME_TABLE_INSERT: &str = r#"
SELECT start_time,
    extract(hour FROM start_time),
    extract(day FROM start_time),
    extract(week FROM start_time),
    extract(month FROM start_time),
    extract(year FROM start_time),
    extract(dayofweek FROM start_time)
FROM songplays
"#;

/// Null-key checks run after the dimension loads; each must return 0.
pub const NULL_KEY_CHECKS: &[(&str, &str)] = &[
    ("users", "user_id"),
    ("songs", "song_id"),
    ("artists", "artist_id"),
    ("time", "start_time"),
];

/// Builds `SELECT COUNT(*) FROM <table> WHERE <column> IS NULL`.
#[must_use]
pub fn null_count_query(table: &str, column: &str) -> String {
    format!("SELECT COUNT(*) FROM {table} WHERE {column} IS NULL")
}
