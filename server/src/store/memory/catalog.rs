use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::{conflict, contains_ci, paginate, replace, MemoryStore};
use crate::models::{Queue, Service, ServiceCategory};
use crate::store::{
    CategoryRepository, Listing, QueueFilter, QueueRepository, ServiceFilter, ServiceRepository,
    StoreError, StoreResult,
};
use crate::utils::pagination::PageRequest;

#[async_trait]
impl CategoryRepository for MemoryStore {
    async fn insert(&self, category: &ServiceCategory) -> StoreResult<()> {
        self.tables
            .write()
            .categories
            .insert(category.id, category.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<ServiceCategory>> {
        Ok(self.tables.read().categories.get(&id).cloned())
    }

    async fn update(&self, category: &ServiceCategory) -> StoreResult<()> {
        let mut tables = self.tables.write();
        replace(&mut tables.categories, category.id, category, "category")
    }

    async fn list(
        &self,
        include_inactive: bool,
        page: PageRequest,
    ) -> StoreResult<Listing<ServiceCategory>> {
        let tables = self.tables.read();
        let mut rows: Vec<ServiceCategory> = tables
            .categories
            .values()
            .filter(|c| include_inactive || c.is_active)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(paginate(rows, page))
    }
}

#[async_trait]
impl ServiceRepository for MemoryStore {
    async fn insert(&self, service: &Service) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if tables
            .services
            .values()
            .any(|s| s.organization_id == service.organization_id && s.code == service.code)
        {
            return Err(conflict("services_organization_id_code_key"));
        }
        tables.services.insert(service.id, service.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Service>> {
        Ok(self.tables.read().services.get(&id).cloned())
    }

    async fn update(&self, service: &Service) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if tables.services.values().any(|s| {
            s.id != service.id
                && s.organization_id == service.organization_id
                && s.code == service.code
        }) {
            return Err(conflict("services_organization_id_code_key"));
        }
        let stored = tables
            .services
            .get_mut(&service.id)
            .ok_or_else(|| StoreError::NotFound("service".into()))?;
        let (issued, rating, ratings) = (
            stored.total_tickets_issued,
            stored.average_rating,
            stored.total_ratings,
        );
        *stored = service.clone();
        stored.total_tickets_issued = issued;
        stored.average_rating = rating;
        stored.total_ratings = ratings;
        Ok(())
    }

    async fn list(
        &self,
        filter: &ServiceFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<Service>> {
        let tables = self.tables.read();
        let mut rows: Vec<Service> = tables
            .services
            .values()
            .filter(|s| filter.include_inactive || s.is_active)
            .filter(|s| filter.organization_id.map_or(true, |o| s.organization_id == o))
            .filter(|s| filter.category_id.map_or(true, |c| s.category_id == Some(c)))
            .filter(|s| filter.status.map_or(true, |st| s.status == st))
            .filter(|s| filter.is_public.map_or(true, |p| s.is_public == p))
            .filter(|s| {
                filter.search.as_deref().map_or(true, |q| {
                    contains_ci(&s.name, q) || contains_ci(&s.code, q) || contains_ci(&s.description, q)
                })
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(paginate(rows, page))
    }

    async fn record_ticket_issued(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let service = tables
            .services
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("service".into()))?;
        service.total_tickets_issued += 1;
        Ok(())
    }

    async fn record_rating(
        &self,
        id: Uuid,
        rating: i16,
        now: DateTime<Utc>,
    ) -> StoreResult<Service> {
        let mut tables = self.tables.write();
        let service = tables
            .services
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("service".into()))?;
        service.record_rating(rating, now);
        Ok(service.clone())
    }
}

#[async_trait]
impl QueueRepository for MemoryStore {
    async fn insert(&self, queue: &Queue) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if tables
            .queues
            .values()
            .any(|q| q.service_id == queue.service_id && q.queue_type == queue.queue_type)
        {
            return Err(conflict("queues_service_id_queue_type_key"));
        }
        tables.queues.insert(queue.id, queue.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Queue>> {
        Ok(self.tables.read().queues.get(&id).cloned())
    }

    async fn update(&self, queue: &Queue) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if tables.queues.values().any(|q| {
            q.id != queue.id && q.service_id == queue.service_id && q.queue_type == queue.queue_type
        }) {
            return Err(conflict("queues_service_id_queue_type_key"));
        }
        let stored = tables
            .queues
            .get_mut(&queue.id)
            .ok_or_else(|| StoreError::NotFound("queue".into()))?;
        let counters = (
            stored.last_ticket_number,
            stored.stats_date,
            stored.daily_tickets_issued,
            stored.daily_tickets_served,
        );
        *stored = queue.clone();
        stored.last_ticket_number = counters.0;
        stored.stats_date = counters.1;
        stored.daily_tickets_issued = counters.2;
        stored.daily_tickets_served = counters.3;
        Ok(())
    }

    async fn list(&self, filter: &QueueFilter, page: PageRequest) -> StoreResult<Listing<Queue>> {
        let tables = self.tables.read();
        let mut rows: Vec<Queue> = tables
            .queues
            .values()
            .filter(|q| filter.include_inactive || q.is_active)
            .filter(|q| filter.organization_id.map_or(true, |o| q.organization_id == o))
            .filter(|q| filter.service_id.map_or(true, |s| q.service_id == s))
            .filter(|q| filter.current_status.map_or(true, |s| q.current_status == s))
            .filter(|q| filter.queue_type.map_or(true, |t| q.queue_type == t))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(paginate(rows, page))
    }

    async fn allocate_ticket_number(
        &self,
        id: Uuid,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> StoreResult<i32> {
        let mut tables = self.tables.write();
        let queue = tables
            .queues
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("queue".into()))?;
        Ok(queue.allocate_number(today, now))
    }

    async fn record_served(
        &self,
        id: Uuid,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let queue = tables
            .queues
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("queue".into()))?;
        if queue.stats_date != today {
            queue.stats_date = today;
            queue.last_ticket_number = 0;
            queue.daily_tickets_issued = 0;
            queue.daily_tickets_served = 0;
        }
        queue.daily_tickets_served += 1;
        queue.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use crate::models::{Queue, QueueType, Service};
    use crate::store::{Store, StoreError};

    #[tokio::test]
    async fn test_queue_update_keeps_counters() {
        let store = Store::in_memory();
        let now = Utc::now();
        let queue = Queue::new(Uuid::new_v4(), Uuid::new_v4(), "Caisse".into(), now);
        store.queues.insert(&queue).await.unwrap();

        let today = now.date_naive();
        assert_eq!(
            store.queues.allocate_ticket_number(queue.id, today, now).await.unwrap(),
            1
        );

        // A stale copy must not roll the numbering back.
        let mut stale = queue.clone();
        stale.name = "Caisse principale".into();
        store.queues.update(&stale).await.unwrap();

        assert_eq!(
            store.queues.allocate_ticket_number(queue.id, today, now).await.unwrap(),
            2
        );
        let stored = store.queues.get(queue.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Caisse principale");
        assert_eq!(stored.daily_tickets_issued, 2);
    }

    #[tokio::test]
    async fn test_one_queue_per_type_and_service() {
        let store = Store::in_memory();
        let now = Utc::now();
        let service_id = Uuid::new_v4();
        let first = Queue::new(service_id, Uuid::new_v4(), "A".into(), now);
        store.queues.insert(&first).await.unwrap();

        let second = Queue::new(service_id, first.organization_id, "B".into(), now);
        assert!(matches!(
            store.queues.insert(&second).await,
            Err(StoreError::Conflict(_))
        ));

        let mut vip = second.clone();
        vip.queue_type = QueueType::Vip;
        store.queues.insert(&vip).await.unwrap();
    }

    #[tokio::test]
    async fn test_service_code_unique_per_organization() {
        let store = Store::in_memory();
        let now = Utc::now();
        let org = Uuid::new_v4();
        store
            .services
            .insert(&Service::new(org, "Retrait".into(), "RET".into(), now))
            .await
            .unwrap();
        let dup = Service::new(org, "Retrait 2".into(), "RET".into(), now);
        assert!(store.services.insert(&dup).await.is_err());

        let elsewhere = Service::new(Uuid::new_v4(), "Retrait".into(), "RET".into(), now);
        store.services.insert(&elsewhere).await.unwrap();
    }
}
