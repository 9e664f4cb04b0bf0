mod db;
mod detection;
mod labels;
mod routes;
mod storage;

use actix_cors::Cors;
use actix_web::http::header;
use actix_web::{App, HttpServer, web};
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_rekognition::Client as RekognitionClient;
use aws_sdk_s3::Client as S3Client;
use db::detection_repository::DetectionRepository;
use detection::pipeline::IngestionPipeline;
use labels::rekognition_service::RekognitionService;
use routes::configure_routes;
use std::env;
use storage::s3_service::S3Service;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    // One AWS configuration per process; every service clones cheap handles
    // over the shared connection pools.
    let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let dynamodb_client = DynamoDbClient::new(&aws_config);
    let s3_client = S3Client::new(&aws_config);
    let rekognition_client = RekognitionClient::new(&aws_config);

    let table_name = env::var("DYNAMODB_TABLE_NAME").unwrap().to_string();
    let bucket_name = env::var("S3_BUCKET_NAME").unwrap().to_string();

    let detection_repo = DetectionRepository::new(dynamodb_client, table_name);
    let s3_service = S3Service::new(s3_client, bucket_name.clone());
    let rekognition_service = RekognitionService::new(rekognition_client, bucket_name);
    let pipeline = IngestionPipeline::new(s3_service, rekognition_service, detection_repo.clone());

    let port = env::var("PORT").unwrap_or_else(|_| "8081".to_string());
    let bind_address = format!("0.0.0.0:{}", port);
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        header::ACCEPT,
                        header::CONTENT_TYPE,
                        header::HeaderName::from_static("x-user-id"),
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(pipeline.clone()))
            .app_data(web::Data::new(detection_repo.clone()))
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
