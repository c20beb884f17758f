use rapo_db::Gateway;

pub struct AppState {
    pub gateway: Gateway,
    pub bearer_token: String,
}
